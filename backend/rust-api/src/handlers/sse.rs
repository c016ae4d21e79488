use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use chrono::Utc;
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::{
    error::ApiError,
    extractors::Caller,
    metrics::SSE_CONNECTIONS_ACTIVE,
    models::timer::{SessionEnded, TimeExpired, TimerEvent, TimerTick},
    services::{
        session_machine::{QuizSession, Tick},
        session_service::SessionService,
        AppState,
    },
};

/// GET /api/v1/quiz/sessions/{id}/stream
///
/// Drives the countdown from the server: one tick per `tick_interval_ms`.
pub async fn session_stream(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = SessionService::new(&state);
    service.get(caller.id(), &session_id).await?;

    let tick_interval = Duration::from_millis(state.config.quiz.tick_interval_ms.max(1));
    tracing::info!(
        "Client connected to SSE stream: session={}, tick_interval={:?}",
        session_id,
        tick_interval
    );

    let stream = create_timer_stream(service, caller.0, session_id, tick_interval);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Decrements the active-connection gauge when the stream is dropped.
struct ConnectionGuard;

impl ConnectionGuard {
    fn new() -> Self {
        SSE_CONNECTIONS_ACTIVE.inc();
        ConnectionGuard
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        SSE_CONNECTIONS_ACTIVE.dec();
    }
}

struct StreamState {
    service: SessionService,
    caller: Option<String>,
    session_id: String,
    tick_interval: Duration,
    finished: bool,
    _guard: ConnectionGuard,
}

fn tick_payload(session: &QuizSession, remaining_seconds: u32) -> TimerTick {
    TimerTick {
        session_id: session.id().to_string(),
        question_index: session.question_index(),
        remaining_seconds,
        bonus_used: session.bonus_used(),
        timestamp: Utc::now(),
    }
}

fn timer_event(session: &QuizSession, tick: Tick) -> Option<TimerEvent> {
    match tick {
        Tick::Counting { remaining } => Some(TimerEvent::TimerTick(tick_payload(session, remaining))),
        Tick::BonusGranted { remaining } => {
            Some(TimerEvent::BonusGranted(tick_payload(session, remaining)))
        }
        Tick::TimedOut(evaluation) => Some(TimerEvent::TimeExpired(TimeExpired {
            session_id: session.id().to_string(),
            question_index: evaluation.question_index,
            correct_answer: session.current_question().map(|q| q.correct_answer),
            score: session.score(),
            timestamp: Utc::now(),
            message: "Time is up".to_string(),
        })),
        Tick::Idle if session.phase().is_terminal() => {
            Some(TimerEvent::SessionEnded(SessionEnded {
                session_id: session.id().to_string(),
                phase: session.phase(),
                score: session.score(),
                timestamp: Utc::now(),
            }))
        }
        Tick::Idle => None,
    }
}

fn create_timer_stream(
    service: SessionService,
    caller: Option<String>,
    session_id: String,
    tick_interval: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let initial = StreamState {
        service,
        caller,
        session_id,
        tick_interval,
        finished: false,
        _guard: ConnectionGuard::new(),
    };

    stream::unfold(initial, |mut st| async move {
        if st.finished {
            return None;
        }

        loop {
            sleep(st.tick_interval).await;

            let (session, tick) = match st
                .service
                .tick(st.caller.as_deref(), &st.session_id)
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!("Stopping SSE stream for session {}: {}", st.session_id, e);
                    return None;
                }
            };

            let Some(payload) = timer_event(&session, tick) else {
                continue;
            };

            if matches!(payload, TimerEvent::SessionEnded(_)) {
                tracing::info!("SSE stream finished: session={}", st.session_id);
                st.finished = true;
            }

            let event = Event::default()
                .event(payload.event_name())
                .data(payload.to_sse_data());
            return Some((Ok(event), st));
        }
    })
}
