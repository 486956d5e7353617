//! The seam between the gatekeeper and the message broker.
//!
//! Frames that pass the interceptor are handed to a [`Broker`], which may
//! answer with frames for the client (CONNECTED, RECEIPT). Routing and
//! fan-out are the broker's business.

use gatehouse_protocol::{header, Command, Frame, SessionId};
use tokio::sync::mpsc;

/// STOMP version announced in CONNECTED frames.
pub const STOMP_VERSION: &str = "1.2";

/// Errors returned by a [`Broker`].
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The broker is no longer accepting frames.
    #[error("broker is closed")]
    Closed,

    /// The broker refused the frame.
    #[error("broker rejected frame: {0}")]
    Rejected(String),
}

/// Receives frames that passed the interceptor.
pub trait Broker: Send + Sync + 'static {
    /// Delivers `frame` from `session` and returns any frames to send
    /// back to that client, in order.
    fn deliver(
        &self,
        session: &SessionId,
        frame: Frame,
    ) -> impl std::future::Future<Output = Result<Vec<Frame>, BrokerError>> + Send;
}

/// In-process broker that queues every delivered frame on an mpsc
/// channel.
///
/// Replies CONNECTED to CONNECT/STOMP and RECEIPT to any frame carrying
/// a `receipt` header.
#[derive(Debug, Clone)]
pub struct ChannelBroker {
    sender: mpsc::UnboundedSender<(SessionId, Frame)>,
}

impl ChannelBroker {
    /// Creates a broker and the receiver that observes delivered frames.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(SessionId, Frame)>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Broker for ChannelBroker {
    async fn deliver(
        &self,
        session: &SessionId,
        frame: Frame,
    ) -> Result<Vec<Frame>, BrokerError> {
        let mut replies = Vec::new();
        if frame.command.is_connect() {
            replies.push(
                Frame::new(Command::Connected)
                    .with_header(header::VERSION, STOMP_VERSION)
                    .with_header("session", session.as_str()),
            );
        }
        if let Some(receipt) = frame.receipt() {
            replies.push(
                Frame::new(Command::Receipt).with_header(header::RECEIPT_ID, receipt),
            );
        }

        self.sender
            .send((session.clone(), frame))
            .map_err(|_| BrokerError::Closed)?;
        Ok(replies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid() -> SessionId {
        SessionId::new("s1")
    }

    #[tokio::test]
    async fn test_deliver_connect_replies_connected() {
        let (broker, mut rx) = ChannelBroker::new();
        let replies = broker
            .deliver(&sid(), Frame::new(Command::Connect))
            .await
            .unwrap();

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].command, Command::Connected);
        assert_eq!(replies[0].header(header::VERSION), Some("1.2"));
        assert_eq!(replies[0].header("session"), Some("s1"));

        let (session, frame) = rx.recv().await.unwrap();
        assert_eq!(session, sid());
        assert_eq!(frame.command, Command::Connect);
    }

    #[tokio::test]
    async fn test_deliver_with_receipt_replies_receipt() {
        let (broker, _rx) = ChannelBroker::new();
        let frame = Frame::new(Command::Subscribe)
            .with_header(header::DESTINATION, "/topic/lobby")
            .with_header(header::RECEIPT, "r-1");

        let replies = broker.deliver(&sid(), frame).await.unwrap();

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].command, Command::Receipt);
        assert_eq!(replies[0].header(header::RECEIPT_ID), Some("r-1"));
    }

    #[tokio::test]
    async fn test_deliver_plain_frame_has_no_replies() {
        let (broker, _rx) = ChannelBroker::new();
        let replies = broker
            .deliver(&sid(), Frame::new(Command::Send))
            .await
            .unwrap();
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn test_deliver_after_receiver_dropped_is_closed() {
        let (broker, rx) = ChannelBroker::new();
        drop(rx);
        let result = broker.deliver(&sid(), Frame::new(Command::Send)).await;
        assert!(matches!(result, Err(BrokerError::Closed)));
    }
}
