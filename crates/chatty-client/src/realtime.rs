use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use chatty_types::api::MessageResponse;
use chatty_types::events::{GatewayCommand, GatewayEvent};

use crate::error::{ClientError, Result};

/// Live connection to the gateway. Identifies on connect, then yields
/// events as they arrive.
pub struct RealtimeClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    user_id: Uuid,
}

impl RealtimeClient {
    /// Connect and authenticate. Returns once the server has answered with
    /// `Ready`.
    pub async fn connect(url: &str, token: &str) -> Result<Self> {
        let (mut stream, _) = tokio_tungstenite::connect_async(url).await?;

        let identify = GatewayCommand::Identify {
            token: token.to_string(),
        };
        let json = serde_json::to_string(&identify)
            .map_err(|e| ClientError::Transport(format!("encode identify: {}", e)))?;
        stream.send(Message::text(json)).await?;

        loop {
            match read_event(&mut stream).await? {
                Some(GatewayEvent::Ready { user_id, username }) => {
                    info!("Gateway ready for {} ({})", username, user_id);
                    return Ok(Self { stream, user_id });
                }
                Some(other) => debug!("Ignoring pre-ready event: {:?}", other),
                None => {
                    return Err(ClientError::Transport(
                        "gateway closed before ready".into(),
                    ));
                }
            }
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Next gateway event, or `None` once the server closes the socket.
    pub async fn next_event(&mut self) -> Result<Option<GatewayEvent>> {
        read_event(&mut self.stream).await
    }

    /// Skip everything but new messages.
    pub async fn next_message(&mut self) -> Result<Option<MessageResponse>> {
        while let Some(event) = self.next_event().await? {
            if let GatewayEvent::NewMessage { message } = event {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    pub async fn request_online_users(&mut self) -> Result<()> {
        let json = serde_json::to_string(&GatewayCommand::GetOnlineUsers)
            .map_err(|e| ClientError::Transport(format!("encode command: {}", e)))?;
        self.stream.send(Message::text(json)).await?;
        Ok(())
    }

    pub async fn close(mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}

async fn read_event(
    stream: &mut WebSocketStream<MaybeTlsStream<TcpStream>>,
) -> Result<Option<GatewayEvent>> {
    while let Some(frame) = stream.next().await {
        match frame? {
            Message::Text(text) => match serde_json::from_str::<GatewayEvent>(text.as_str()) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => warn!("Unparseable gateway event: {}", e),
            },
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}
