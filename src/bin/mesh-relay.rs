use actix::{Actor, AsyncContext, Handler, Message, StreamHandler};
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer, Responder};
use actix_web_actors::ws;
use clap::Parser;
use meshcall::{
    protocol::{ClientMessage, ParticipantId, SignalingEvent},
    relay::{Relay, RelayHandle},
};
use tokio::sync::mpsc;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Signaling relay for meshcall clients.
#[derive(Parser, Debug)]
#[command(name = "mesh-relay", version)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "MESH_RELAY_BIND", default_value = "0.0.0.0:4000")]
    bind: String,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let relay = Relay::spawn();
    tracing::info!("relay listening on {}", args.bind);

    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(relay.clone()))
            .service(index)
            .route("/socket", web::get().to(socket))
    })
    .bind(args.bind)?
    .run()
    .await
}

#[actix_web::get("/")]
async fn index() -> impl Responder {
    HttpResponse::Ok().body("healthy")
}

async fn socket(
    req: HttpRequest,
    relay: web::Data<RelayHandle>,
    stream: web::Payload,
) -> impl Responder {
    let server = WebSocket::new(relay.get_ref().clone());
    ws::start(server, &req, stream)
}

struct WebSocket {
    relay: RelayHandle,
    participant_id: Option<ParticipantId>,
}

impl WebSocket {
    pub fn new(relay: RelayHandle) -> Self {
        Self {
            relay,
            participant_id: None,
        }
    }
}

impl Actor for WebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("WebSocket started");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(participant_id) = self.participant_id.take() {
            self.relay.leave(participant_id);
        }
        tracing::info!("WebSocket stopped");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WebSocket {
    fn handle(&mut self, item: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match item {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Pong(_)) => tracing::info!("pong received"),
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => {
                    ctx.address().do_send(Inbound(message));
                }
                Err(error) => {
                    tracing::error!("failed to parse client message: {}\n{}", error, text);
                }
            },
            Ok(ws::Message::Close(reason)) => ctx.close(reason),
            _ => (),
        }
    }
}

impl Handler<Inbound> for WebSocket {
    type Result = ();

    fn handle(&mut self, Inbound(msg): Inbound, ctx: &mut Self::Context) -> Self::Result {
        tracing::debug!("received message: {:?}", msg);

        match (self.participant_id.clone(), msg) {
            (None, ClientMessage::Join { room }) => {
                let participant_id = ParticipantId::generate();
                let (sender, mut receiver) = mpsc::unbounded_channel::<SignalingEvent>();
                let address = ctx.address();
                actix::spawn(async move {
                    while let Some(event) = receiver.recv().await {
                        address.do_send(Outbound(event));
                    }
                });
                self.relay.join(room, participant_id.clone(), sender);
                self.participant_id = Some(participant_id);
            }
            (None, msg) => tracing::warn!("message before join: {:?}", msg),
            (Some(participant_id), msg) => self.relay.forward(participant_id, msg),
        }
    }
}

impl Handler<Outbound> for WebSocket {
    type Result = ();

    fn handle(&mut self, Outbound(event): Outbound, ctx: &mut Self::Context) -> Self::Result {
        match serde_json::to_string(&event) {
            Ok(text) => ctx.text(text),
            Err(err) => tracing::error!("failed to serialize relay message: {}", err),
        }
    }
}

#[derive(Message, Debug)]
#[rtype(result = "()")]
struct Inbound(ClientMessage);

#[derive(Message, Debug)]
#[rtype(result = "()")]
struct Outbound(SignalingEvent);
