use std::error::Error;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use askama::Template;
use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jumble_rush::config;
use jumble_rush::game::{self, GameCommand, GameHandle};
use jumble_rush::types::*;

#[derive(Clone)]
struct AppState {
    game: GameHandle,
    questions: Arc<Vec<QuestionCard>>,
    timer_seconds: u64,
}

// ─── Templates ────────────────────────────────────────────────────

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    timer_seconds: u64,
}

#[derive(Template)]
#[template(path = "admin.html")]
struct AdminTemplate {
    questions: Vec<QuestionCard>,
    timer_seconds: u64,
}

fn render<T: Template>(template: &T) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Failed to render template: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ─── Routes ───────────────────────────────────────────────────────

async fn index_page(State(state): State<AppState>) -> Response {
    render(&IndexTemplate {
        timer_seconds: state.timer_seconds,
    })
}

async fn admin_page(State(state): State<AppState>) -> Response {
    render(&AdminTemplate {
        questions: state.questions.as_ref().clone(),
        timer_seconds: state.timer_seconds,
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn into_command(socket_id: &str, msg: ClientMsg) -> GameCommand {
    let socket_id = socket_id.to_string();
    match msg {
        ClientMsg::Join { team_name } => GameCommand::Join { socket_id, team_name },
        ClientMsg::SubmitInvestment { invested } => {
            GameCommand::SubmitInvestment { socket_id, invested }
        }
        ClientMsg::SubmitAnswer { answer } => GameCommand::SubmitAnswer { socket_id, answer },
        ClientMsg::TabSwitchAlert => GameCommand::TabSwitch { socket_id },
        ClientMsg::HostLogin { password } => GameCommand::HostLogin { socket_id, password },
        ClientMsg::SelectQuestion { question_id } => {
            GameCommand::SelectQuestion { socket_id, question_id }
        }
        ClientMsg::StartTimer => GameCommand::StartTimer { socket_id },
        ClientMsg::StopTimer => GameCommand::StopTimer { socket_id },
        ClientMsg::FinishGame => GameCommand::FinishGame { socket_id },
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let sender = Arc::new(Mutex::new(sender));

    let socket_id = uuid::Uuid::new_v4().to_string();
    tracing::info!("WebSocket connected: {}", socket_id);

    // Subscribe before any command so no reply can be missed
    let mut event_rx = state.game.subscribe();

    let sender_clone = sender.clone();
    let socket_id_clone = socket_id.clone();
    let event_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    if !event.is_for(&socket_id_clone) {
                        continue;
                    }
                    if !send_msg(&sender_clone, event.msg()).await {
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Socket {} lagged, skipped {} events", socket_id_clone, skipped);
                }
                Err(RecvError::Closed) => return,
            }
        }
    });

    // Process incoming messages
    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };

        let client_msg: ClientMsg = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid message from {}: {}", socket_id, e);
                send_msg(&sender, &ServerMsg::Error {
                    message: format!("Invalid message format: {}", e),
                })
                .await;
                continue;
            }
        };

        state.game.send(into_command(&socket_id, client_msg)).await;
    }

    // Socket disconnected
    tracing::info!("WebSocket disconnected: {}", socket_id);
    event_task.abort();

    state
        .game
        .send(GameCommand::Disconnect { socket_id })
        .await;
}

/// Serialize and send; false once the socket is gone.
async fn send_msg(sender: &Arc<Mutex<SplitSink<WebSocket, Message>>>, msg: &ServerMsg) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => {
            let mut s = sender.lock().await;
            s.send(Message::Text(json.into())).await.is_ok()
        }
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            true
        }
    }
}

// ─── Startup ──────────────────────────────────────────────────────

/// LAN address participants can reach. Connecting a UDP socket sends no
/// packet; it only makes the OS choose the outbound interface.
async fn lan_ipv4() -> Option<Ipv4Addr> {
    let socket = tokio::net::UdpSocket::bind("0.0.0.0:0").await.ok()?;
    socket.connect("192.0.2.1:80").await.ok()?;
    participant_ip(socket.local_addr().ok()?.ip())
}

fn participant_ip(ip: IpAddr) -> Option<Ipv4Addr> {
    match ip {
        IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() && !v4.is_link_local() => {
            Some(v4)
        }
        _ => None,
    }
}

// ─── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jumble_rush=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_dir = config::config_dir();
    config::init(&config_dir)?;

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()?;

    let game_config = config::load_game_config(&config_dir)?;
    let questions = config::load_questions(&config_dir)?;
    tracing::info!(
        "Loaded {} questions, {}s answering timer",
        questions.len(),
        game_config.timer_seconds
    );

    let state = AppState {
        questions: Arc::new(questions.iter().map(QuestionCard::from).collect()),
        timer_seconds: game_config.timer_seconds,
        game: game::spawn_game(game_config, questions),
    };

    let app = Router::new()
        .route("/", get(index_page))
        .route("/admin", get(admin_page))
        .route("/ws", get(ws_handler))
        .nest_service("/static", ServeDir::new("static"))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    tracing::info!("Jumble Rush running on port {}", port);
    tracing::info!("Host access: http://localhost:{}/admin", port);
    match lan_ipv4().await {
        Some(ip) => tracing::info!("Participant access: http://{}:{}", ip, port),
        None => tracing::info!("Participant access: http://localhost:{}", port),
    }

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_ip_skips_internal_addresses() {
        assert_eq!(
            participant_ip(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))),
            Some(Ipv4Addr::new(192, 168, 1, 20))
        );
        assert_eq!(participant_ip(IpAddr::V4(Ipv4Addr::LOCALHOST)), None);
        assert_eq!(participant_ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED)), None);
        assert_eq!(participant_ip(IpAddr::V4(Ipv4Addr::new(169, 254, 0, 7))), None);
        assert_eq!(participant_ip(IpAddr::V6(std::net::Ipv6Addr::LOCALHOST)), None);
    }

    #[test]
    fn test_client_messages_map_to_commands() {
        assert_eq!(
            into_command("s1", ClientMsg::SubmitAnswer { answer: "diode".into() }),
            GameCommand::SubmitAnswer { socket_id: "s1".into(), answer: "diode".into() }
        );
        assert_eq!(
            into_command("s1", ClientMsg::TabSwitchAlert),
            GameCommand::TabSwitch { socket_id: "s1".into() }
        );
    }
}
