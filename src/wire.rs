//! Line-delimited JSON protocol: one request object per line in, one
//! response object per line out, in order. After `listen`, event lines
//! (`{"event": …}`) for that restaurant are interleaved between responses.

use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use ulid::Ulid;

use crate::endorsement;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{request_label, REQUEST_DURATION_SECONDS, REQUESTS_TOTAL};

const MAX_LINE_BYTES: usize = 64 * 1024;
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    CreateRestaurant {
        id: Option<Ulid>,
        name: String,
        tables: TableCounts,
        #[serde(default)]
        endorsements: Vec<String>,
        #[serde(default = "all_day")]
        hours: Hours,
    },
    RegisterDiner {
        id: Option<Ulid>,
        name: String,
        #[serde(default)]
        preferences: Vec<String>,
    },
    Available {
        party: PartySpec,
        start: Ms,
        end: Ms,
        #[serde(default)]
        filter: Vec<String>,
    },
    Book {
        restaurant_id: Ulid,
        party: PartySpec,
        start: Ms,
        end: Ms,
    },
    Cancel {
        reservation_id: Ulid,
    },
    Reservations {
        restaurant_id: Ulid,
    },
    FreeCapacity {
        restaurant_id: Ulid,
        start: Ms,
        end: Ms,
    },
    Restaurants,
    Listen {
        restaurant_id: Ulid,
    },
}

fn all_day() -> Hours {
    Hours::AllDay
}

/// Either registered diners, or a head count with explicit requirements.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PartySpec {
    Diners {
        diners: Vec<Ulid>,
    },
    Anonymous {
        size: u32,
        #[serde(default)]
        endorsements: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Ok(Value),
    Error {
        kind: &'static str,
        message: String,
        retryable: bool,
    },
}

impl Response {
    fn ok<T: Serialize>(value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => Response::Ok(v),
            Err(e) => Response::Error {
                kind: "internal",
                message: e.to_string(),
                retryable: false,
            },
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Response::Error {
            kind: "bad_request",
            message: message.into(),
            retryable: false,
        }
    }

    fn status(&self) -> &'static str {
        match self {
            Response::Ok(_) => "ok",
            Response::Error { kind, .. } => *kind,
        }
    }
}

impl From<EngineError> for Response {
    fn from(e: EngineError) -> Self {
        Response::Error {
            kind: e.kind(),
            message: e.to_string(),
            retryable: e.is_retryable(),
        }
    }
}

#[derive(Serialize)]
struct Created {
    id: Ulid,
}

#[derive(Serialize)]
struct Listening {
    restaurant_id: Ulid,
}

#[derive(Serialize)]
struct Notification<'a> {
    event: &'a Event,
}

#[derive(Serialize)]
struct Booked {
    reservation_id: Ulid,
    reservation: Reservation,
}

/// Per-connection state: restaurants this client listens to and the channel
/// their events are forwarded on.
pub struct Session {
    listening: HashSet<Ulid>,
    events: mpsc::Sender<Event>,
}

impl Session {
    pub fn new(events: mpsc::Sender<Event>) -> Self {
        Self {
            listening: HashSet::new(),
            events,
        }
    }

    fn listen(&mut self, engine: &Engine, restaurant_id: Ulid) -> Result<(), EngineError> {
        if engine.get_restaurant_state(&restaurant_id).is_none() {
            return Err(EngineError::NotFound(restaurant_id));
        }
        if self.listening.insert(restaurant_id) {
            forward_events(engine.notify.subscribe(restaurant_id), self.events.clone());
        }
        Ok(())
    }
}

/// Pump one restaurant's broadcast into a connection until either side closes.
fn forward_events(mut rx: broadcast::Receiver<Event>, tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                received = rx.recv() => match received {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("listener fell behind, {n} events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });
}

fn window(start: Ms, end: Ms) -> Result<Span, EngineError> {
    Span::try_new(start, end).ok_or(EngineError::InvalidWindow("start must be before end"))
}

fn resolve_party(engine: &Engine, spec: PartySpec) -> Result<Party, EngineError> {
    match spec {
        PartySpec::Diners { diners } => engine.assemble_party(&diners),
        PartySpec::Anonymous { size, endorsements } => Ok(Party::anonymous(
            size,
            endorsement::normalize_all(endorsements),
        )),
    }
}

async fn execute(engine: &Engine, session: &mut Session, req: Request) -> Result<Response, EngineError> {
    Ok(match req {
        Request::CreateRestaurant {
            id,
            name,
            tables,
            endorsements,
            hours,
        } => {
            let id = id.unwrap_or_else(Ulid::new);
            engine
                .create_restaurant(id, name, tables, endorsement::normalize_all(endorsements), hours)
                .await?;
            Response::ok(Created { id })
        }
        Request::RegisterDiner {
            id,
            name,
            preferences,
        } => {
            let id = id.unwrap_or_else(Ulid::new);
            engine
                .register_diner(id, name, endorsement::normalize_all(preferences))
                .await?;
            Response::ok(Created { id })
        }
        Request::Available {
            party,
            start,
            end,
            filter,
        } => {
            let party = resolve_party(engine, party)?;
            let filter = endorsement::normalize_all(filter);
            let matches = engine
                .find_available(&party, window(start, end)?, &filter)
                .await?;
            Response::ok(matches)
        }
        Request::Book {
            restaurant_id,
            party,
            start,
            end,
        } => {
            let party = resolve_party(engine, party)?;
            let reservation = engine.book(restaurant_id, &party, window(start, end)?).await?;
            Response::ok(Booked {
                reservation_id: reservation.id,
                reservation,
            })
        }
        Request::Cancel { reservation_id } => Response::ok(engine.cancel(reservation_id).await?),
        Request::Reservations { restaurant_id } => {
            Response::ok(engine.get_reservations(restaurant_id).await?)
        }
        Request::FreeCapacity {
            restaurant_id,
            start,
            end,
        } => Response::ok(engine.free_capacity(restaurant_id, window(start, end)?).await?),
        Request::Restaurants => Response::ok(engine.list_restaurants().await),
        Request::Listen { restaurant_id } => {
            session.listen(engine, restaurant_id)?;
            Response::ok(Listening { restaurant_id })
        }
    })
}

/// Parse and run one request line.
pub async fn handle_line(engine: &Engine, session: &mut Session, line: &str) -> Response {
    let req: Request = match serde_json::from_str(line) {
        Ok(req) => req,
        Err(e) => {
            metrics::counter!(REQUESTS_TOTAL, "op" => "unknown", "status" => "bad_request")
                .increment(1);
            return Response::bad_request(e.to_string());
        }
    };

    let op = request_label(&req);
    let started = Instant::now();
    let response = execute(engine, session, req).await.unwrap_or_else(Response::from);
    metrics::histogram!(REQUEST_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
    metrics::counter!(REQUESTS_TOTAL, "op" => op, "status" => response.status()).increment(1);
    if let Response::Error { kind, message, .. } = &response {
        tracing::debug!("{op} failed ({kind}): {message}");
    }
    response
}

fn codec_err(e: LinesCodecError) -> io::Error {
    match e {
        LinesCodecError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

/// Serve one client until it hangs up.
pub async fn process_connection(socket: TcpStream, engine: Arc<Engine>) -> io::Result<()> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
    let (events_tx, mut events_rx) = mpsc::channel(EVENT_BUFFER);
    let mut session = Session::new(events_tx);

    loop {
        let outgoing = tokio::select! {
            line = framed.next() => {
                let Some(line) = line else { break };
                let response = match line {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => handle_line(&engine, &mut session, &line).await,
                    Err(LinesCodecError::MaxLineLengthExceeded) => {
                        Response::bad_request(format!("request exceeds {MAX_LINE_BYTES} bytes"))
                    }
                    Err(e) => return Err(codec_err(e)),
                };
                serde_json::to_string(&response)
            }
            Some(event) = events_rx.recv() => serde_json::to_string(&Notification { event: &event }),
        };
        let encoded = outgoing.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        framed.send(encoded).await.map_err(codec_err)?;
    }
    Ok(())
}
