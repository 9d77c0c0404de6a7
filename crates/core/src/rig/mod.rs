//! Default channel layout for the character rig: which recorded joint angle
//! drives which bone axis.

use crate::{ChannelConfig, ChannelSpec, FanOutTarget, Result, Transform};

/// Relative share of the trunk signals carried by each spine segment.
pub const SPINE_WEIGHTS: [(&str, f32); 5] = [
    ("spine_01", 0.10),
    ("spine_02", 0.20),
    ("spine_03", 0.30),
    ("spine_04", 0.25),
    ("spine_05", 0.15),
];

/// Source columns spread over the spine chain instead of a single bone.
pub const SPINE_COLUMNS: [(&str, &str); 3] = [
    ("Thorax_extension", "pitch"),
    ("Thorax_lateral_flexion_rotation", "roll"),
    ("Thorax_axial_rotation", "yaw"),
];

/// Source column → (bone, axis) for every directly driven bone.
pub const BONE_TABLE: [(&str, &str, &str); 42] = [
    ("Pelvis_extension", "pelvis", "pitch"),
    ("Pelvis_lateral_flexion_rotation", "pelvis", "roll"),
    ("Pelvis_axial_rotation", "pelvis", "yaw"),
    ("Neck_flexion", "neck_01", "pitch"),
    ("Neck_left-ward_tilt", "neck_01", "roll"),
    ("Neck_right-ward_rotation", "neck_01", "yaw"),
    ("LeftHip_flexion", "thigh_l", "pitch"),
    ("LeftHip_adduction", "thigh_l", "roll"),
    ("LeftHip_external_rotation", "thigh_l", "yaw"),
    ("LeftKnee_flexion", "calf_l", "pitch"),
    ("LeftKnee_adduction", "calf_l", "roll"),
    ("LeftKnee_external_rotation", "calf_l", "yaw"),
    ("LeftAnkle_dorsiflexion", "foot_l", "pitch"),
    ("LeftAnkle_inversion", "foot_l", "roll"),
    ("LeftAnkle_internal_rotation", "foot_l", "yaw"),
    ("RightHip_flexion", "thigh_r", "pitch"),
    ("RightHip_adduction", "thigh_r", "roll"),
    ("RightHip_external_rotation", "thigh_r", "yaw"),
    ("RightKnee_flexion", "calf_r", "pitch"),
    ("RightKnee_adduction", "calf_r", "roll"),
    ("RightKnee_external_rotation", "calf_r", "yaw"),
    ("RightAnkle_dorsiflexion", "foot_r", "pitch"),
    ("RightAnkle_inversion", "foot_r", "roll"),
    ("RightAnkle_internal_rotation", "foot_r", "yaw"),
    ("LeftShoulder_flexion", "clavicle_l", "pitch"),
    ("LeftShoulder_abduction", "clavicle_l", "roll"),
    ("LeftShoulder_external_rotation", "clavicle_l", "yaw"),
    ("LeftElbow_flexion", "lowerarm_l", "pitch"),
    ("LeftElbow_abduction", "lowerarm_l", "roll"),
    ("LeftElbow_pronation", "lowerarm_l", "yaw"),
    ("LeftWrist_flexion", "hand_l", "pitch"),
    ("LeftWrist_adduction", "hand_l", "roll"),
    ("LeftWrist_pronation", "hand_l", "yaw"),
    ("RightShoulder_flexion", "clavicle_r", "pitch"),
    ("RightShoulder_abduction", "clavicle_r", "roll"),
    ("RightShoulder_external_rotation", "clavicle_r", "yaw"),
    ("RightElbow_flexion", "lowerarm_r", "pitch"),
    ("RightElbow_abduction", "lowerarm_r", "roll"),
    ("RightElbow_pronation", "lowerarm_r", "yaw"),
    ("RightWrist_flexion", "hand_r", "pitch"),
    ("RightWrist_adduction", "hand_r", "roll"),
    ("RightWrist_pronation", "hand_r", "yaw"),
];

pub fn bone_address(bone: &str, axis: &str) -> String {
    format!("/bone/{bone}/{axis}")
}

/// The standard rig table: one channel per directly mapped column, with the
/// thorax columns fanned out over the spine.
pub fn default_channels() -> Result<ChannelConfig> {
    let direct = BONE_TABLE.iter().map(|(column, bone, axis)| {
        ChannelSpec::single(*column, bone_address(bone, axis), Transform::default())
    });
    let spine = SPINE_COLUMNS.iter().map(|(column, axis)| {
        let fanout = SPINE_WEIGHTS
            .iter()
            .map(|(bone, weight)| FanOutTarget::new(bone_address(bone, axis), *weight))
            .collect();
        ChannelSpec::fan_out(*column, fanout, Transform::default())
    });
    ChannelConfig::from_specs(direct.chain(spine).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Target;

    #[test]
    fn default_table_covers_every_column() {
        let config = default_channels().unwrap();
        assert_eq!(config.len(), BONE_TABLE.len() + SPINE_COLUMNS.len());
        assert_eq!(config.message_count(), BONE_TABLE.len() + 3 * SPINE_WEIGHTS.len());
        assert_eq!(config.sources().len(), config.len());
    }

    #[test]
    fn thorax_fans_out_over_five_spine_bones() {
        let config = default_channels().unwrap();
        let thorax = config
            .channels()
            .iter()
            .find(|channel| channel.source == "Thorax_axial_rotation")
            .unwrap();
        match &thorax.target {
            Target::FanOut(entries) => {
                let addresses: Vec<&str> = entries.iter().map(|e| e.address.as_str()).collect();
                assert_eq!(addresses[0], "/bone/spine_01/yaw");
                assert_eq!(addresses[4], "/bone/spine_05/yaw");
                let total: f32 = entries.iter().map(|e| e.weight).sum();
                assert!((total - 1.0).abs() < 1e-6);
            }
            Target::Single(_) => panic!("thorax should fan out"),
        }
    }

    #[test]
    fn right_wrist_pitch_maps_to_hand_bone() {
        let config = default_channels().unwrap();
        let wrist = config
            .channels()
            .iter()
            .find(|channel| channel.source == "RightWrist_flexion")
            .unwrap();
        assert_eq!(wrist.resolve(12.5), vec![("/bone/hand_r/pitch", 12.5)]);
    }
}
