//! OSC messaging for the rig: one address, typed arguments, sent as UDP
//! datagrams. The wire layout comes from `rosc`; bundles are not used by the
//! rig and are rejected on receipt.

use std::{
    collections::HashSet,
    fmt,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    sync::{Arc, Mutex, MutexGuard},
};

use rosc::{OscPacket, OscType};

use crate::{Result, StreamerError};

const MAX_DATAGRAM: usize = 65_507;

/// Typed OSC argument.
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Float(f32),
    Int(i32),
    Str(String),
}

impl OscArg {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            OscArg::Float(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for OscArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscArg::Float(value) => write!(f, "{value:.4}"),
            OscArg::Int(value) => write!(f, "{value}"),
            OscArg::Str(value) => write!(f, "{value:?}"),
        }
    }
}

/// Single OSC message.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>, arg: OscArg) -> Self {
        Self::with_args(address, vec![arg])
    }

    pub fn with_args(address: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(&self.address, &self.args)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (_, packet) = rosc::decoder::decode_udp(bytes)
            .map_err(|err| StreamerError::transport(format!("undecodable OSC packet: {err:?}")))?;
        let message = match packet {
            OscPacket::Message(message) => message,
            OscPacket::Bundle(_) => {
                return Err(StreamerError::transport("OSC bundles are not supported"))
            }
        };
        if !message.addr.starts_with('/') {
            return Err(StreamerError::transport(format!(
                "OSC address `{}` does not start with '/'",
                message.addr
            )));
        }

        let args = message
            .args
            .into_iter()
            .map(|arg| match arg {
                OscType::Float(value) => Ok(OscArg::Float(value)),
                OscType::Int(value) => Ok(OscArg::Int(value)),
                OscType::String(value) => Ok(OscArg::Str(value)),
                other => Err(StreamerError::transport(format!(
                    "unsupported OSC argument {other:?}"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            address: message.addr,
            args,
        })
    }
}

impl fmt::Display for OscMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Encodes an address and its arguments into an OSC message packet.
pub fn encode(address: &str, args: &[OscArg]) -> Result<Vec<u8>> {
    let packet = OscPacket::Message(rosc::OscMessage {
        addr: address.to_string(),
        args: args.iter().cloned().map(OscType::from).collect(),
    });
    rosc::encoder::encode(&packet)
        .map_err(|err| StreamerError::transport(format!("{address}: cannot encode: {err:?}")))
}

impl From<OscArg> for OscType {
    fn from(arg: OscArg) -> Self {
        match arg {
            OscArg::Float(value) => OscType::Float(value),
            OscArg::Int(value) => OscType::Int(value),
            OscArg::Str(value) => OscType::String(value),
        }
    }
}

/// Fire-and-forget primitive the streamer emits through.
pub trait OscSender: Send {
    fn send_message(&mut self, address: &str, args: Vec<OscArg>) -> Result<()>;

    fn send(&mut self, address: &str, arg: OscArg) -> Result<()> {
        self.send_message(address, vec![arg])
    }
}

impl<T: OscSender + ?Sized> OscSender for Box<T> {
    fn send_message(&mut self, address: &str, args: Vec<OscArg>) -> Result<()> {
        (**self).send_message(address, args)
    }
}

/// Sends each message as one non-blocking UDP datagram.
#[derive(Debug)]
pub struct UdpOscSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpOscSender {
    pub fn connect(target: &str) -> Result<Self> {
        let target = target
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| StreamerError::config(format!("`{target}` did not resolve")))?;
        let bind: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind)?;
        socket.set_nonblocking(true)?;
        tracing::info!(receiver = %target, local = ?socket.local_addr().ok(), "OSC sender ready");
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl OscSender for UdpOscSender {
    fn send_message(&mut self, address: &str, args: Vec<OscArg>) -> Result<()> {
        let packet = encode(address, &args)?;
        self.socket
            .send_to(&packet, self.target)
            .map_err(|err| StreamerError::transport(format!("{address}: {err}")))?;
        Ok(())
    }
}

/// Dry-run sender that only logs.
#[derive(Debug, Default)]
pub struct LogSender;

impl OscSender for LogSender {
    fn send_message(&mut self, address: &str, args: Vec<OscArg>) -> Result<()> {
        let message = OscMessage::with_args(address, args);
        tracing::info!(target: "osc", %message, "send");
        Ok(())
    }
}

/// Records every message in memory. Clones share the same buffer, so one
/// clone can be handed to a streamer while another is inspected.
#[derive(Debug, Clone, Default)]
pub struct MemorySender {
    shared: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    messages: Vec<OscMessage>,
    failing: HashSet<String>,
}

impl MemorySender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later send to `address` fail with a transport error.
    pub fn fail_on(&self, address: impl Into<String>) {
        if let Ok(mut state) = self.lock() {
            state.failing.insert(address.into());
        }
    }

    pub fn messages(&self) -> Vec<OscMessage> {
        self.lock()
            .map(|state| state.messages.clone())
            .unwrap_or_default()
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<OscMessage> {
        self.lock()
            .map(|mut state| std::mem::take(&mut state.messages))
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.shared
            .lock()
            .map_err(|_| StreamerError::transport("memory sender has been poisoned"))
    }
}

impl OscSender for MemorySender {
    fn send_message(&mut self, address: &str, args: Vec<OscArg>) -> Result<()> {
        let mut state = self.lock()?;
        if state.failing.contains(address) {
            return Err(StreamerError::transport(format!("{address}: refused")));
        }
        state.messages.push(OscMessage::with_args(address, args));
        Ok(())
    }
}

/// Blocks on `bind`, decoding each datagram and handing it to `on_message`
/// until the callback returns `false`. Undecodable datagrams are logged and
/// skipped.
pub fn listen<F>(bind: &str, on_message: F) -> Result<()>
where
    F: FnMut(SocketAddr, OscMessage) -> bool,
{
    let socket = UdpSocket::bind(bind)?;
    tracing::info!(local = ?socket.local_addr().ok(), "listening for OSC");
    listen_on(&socket, on_message)
}

pub fn listen_on<F>(socket: &UdpSocket, mut on_message: F) -> Result<()>
where
    F: FnMut(SocketAddr, OscMessage) -> bool,
{
    let mut buffer = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, peer) = socket.recv_from(&mut buffer)?;
        match OscMessage::decode(&buffer[..len]) {
            Ok(message) => {
                if !on_message(peer, message) {
                    return Ok(());
                }
            }
            Err(err) => tracing::warn!(%peer, %err, "dropping undecodable datagram"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_float_message_layout() {
        let bytes = encode("/bone/hand_r/pitch", &[OscArg::Float(7.0)]).unwrap();
        let mut expected = b"/bone/hand_r/pitch\0\0".to_vec();
        expected.extend_from_slice(b",f\0\0");
        expected.extend_from_slice(&7.0_f32.to_be_bytes());
        assert_eq!(bytes, expected);
        assert_eq!(bytes.len() % 4, 0);
    }

    #[test]
    fn aligned_strings_still_get_a_terminator() {
        let bytes = encode("/abc", &[OscArg::Int(3)]).unwrap();
        assert_eq!(&bytes[..8], b"/abc\0\0\0\0");
        assert_eq!(&bytes[8..12], b",i\0\0");
        assert_eq!(&bytes[12..], &[0, 0, 0, 3]);
    }

    #[test]
    fn decodes_mixed_arguments() {
        let message = OscMessage {
            address: "/mh/mode".to_string(),
            args: vec![
                OscArg::Str("TURN_LEFT".to_string()),
                OscArg::Int(-4),
                OscArg::Float(0.35),
            ],
        };
        assert_eq!(OscMessage::decode(&message.encode().unwrap()).unwrap(), message);
    }

    #[test]
    fn rejects_truncated_packets() {
        let bytes = encode("/x", &[OscArg::Float(1.0)]).unwrap();
        assert!(OscMessage::decode(&bytes[..bytes.len() - 2]).is_err());
        assert!(OscMessage::decode(b"nope\0\0\0\0").is_err());
    }

    #[test]
    fn memory_sender_records_and_fails_on_request() {
        let recorder = MemorySender::new();
        let mut sender = recorder.clone();
        sender.send("/ok", OscArg::Float(1.0)).unwrap();
        recorder.fail_on("/bad");
        let err = sender.send("/bad", OscArg::Float(2.0)).unwrap_err();
        assert!(matches!(err, StreamerError::Transport(_)));

        let messages = recorder.take();
        assert_eq!(messages, vec![OscMessage::new("/ok", OscArg::Float(1.0))]);
        assert!(recorder.messages().is_empty());
    }

    #[test]
    fn multi_argument_messages_keep_their_order() {
        let recorder = MemorySender::new();
        let mut sender: Box<dyn OscSender> = Box::new(recorder.clone());
        sender
            .send_message(
                "/cmd/pose",
                vec![OscArg::Str("sitting".to_string()), OscArg::Float(0.35)],
            )
            .unwrap();

        let message = &recorder.messages()[0];
        assert_eq!(message.to_string(), "/cmd/pose \"sitting\" 0.3500");
        let bytes = message.encode().unwrap();
        assert_eq!(&bytes[12..16], b",sf\0");
        assert_eq!(&OscMessage::decode(&bytes).unwrap(), message);
    }
}
