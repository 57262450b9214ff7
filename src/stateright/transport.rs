//! Stateright Model for the Batch Transport
//!
//! Exhaustively explores producer pushes, connection failures, timer
//! flushes and shutdown against the transport state machine:
//! - QUEUE_BOUNDED: the emission queue never exceeds its capacity
//! - FRAME_BOUNDED: a frame exceeds the packet size only as a single line
//! - LINES_CONSERVED: every accepted line is sent, discarded, queued or framed
//! - CLOSED_TERMINAL: once closed nothing is queued, framed or accepted

use stateright::{Model, Property};

#[derive(Clone, Debug)]
pub struct TransportModelConfig {
    pub queue_capacity: usize,
    pub max_packet_size: usize,
    /// Line sizes producers may emit
    pub line_sizes: Vec<usize>,
    /// Bound on producer pushes, keeps the state space finite
    pub max_produced: usize,
}

impl Default for TransportModelConfig {
    fn default() -> Self {
        TransportModelConfig {
            queue_capacity: 2,
            max_packet_size: 4,
            line_sizes: vec![1, 3, 5],
            max_produced: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Connecting,
    Streaming,
    Waiting,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransportModelState {
    pub phase: Phase,
    /// Sizes of queued lines, oldest first
    pub queue: Vec<usize>,
    pub frame_bytes: usize,
    pub frame_lines: usize,
    pub produced: usize,
    pub enqueued: usize,
    pub dropped: usize,
    pub discarded: usize,
    pub sent_lines: usize,
    /// Frames sent over the packet size with more than one line
    pub oversize_frames: usize,
}

impl TransportModelState {
    pub fn new() -> Self {
        TransportModelState {
            phase: Phase::Connecting,
            queue: Vec::new(),
            frame_bytes: 0,
            frame_lines: 0,
            produced: 0,
            enqueued: 0,
            dropped: 0,
            discarded: 0,
            sent_lines: 0,
            oversize_frames: 0,
        }
    }

    fn send_frame(&mut self, max_packet_size: usize) {
        if self.frame_bytes > max_packet_size && self.frame_lines > 1 {
            self.oversize_frames += 1;
        }
        self.sent_lines += self.frame_lines;
        self.frame_bytes = 0;
        self.frame_lines = 0;
    }

    fn fail_frame(&mut self) {
        self.discarded += self.frame_lines;
        self.frame_bytes = 0;
        self.frame_lines = 0;
    }

    fn append(&mut self, size: usize) {
        self.frame_bytes += size;
        self.frame_lines += 1;
    }

    fn would_overflow(&self, size: usize, max_packet_size: usize) -> bool {
        self.frame_lines > 0 && self.frame_bytes + size > max_packet_size
    }
}

impl Default for TransportModelState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TransportAction {
    /// Producer try_send of a line
    Push { size: usize },
    ConnectOk,
    ConnectFail,
    /// Streaming: take the next line, flushing first on overflow
    Dequeue,
    /// Streaming: the overflow flush before the next line fails
    DequeueWriteFail,
    /// Streaming: flush timer fires
    Tick,
    TickWriteFail,
    /// Waiting: next line is dequeued and thrown away
    Discard,
    BackoffElapsed,
    /// Cancellation; the boolean is whether the final flush succeeds
    Close { flush_ok: bool },
}

pub struct TransportModel {
    pub config: TransportModelConfig,
}

impl TransportModel {
    pub fn new() -> Self {
        TransportModel {
            config: TransportModelConfig::default(),
        }
    }

    pub fn with_config(config: TransportModelConfig) -> Self {
        TransportModel { config }
    }
}

impl Default for TransportModel {
    fn default() -> Self {
        Self::new()
    }
}

impl Model for TransportModel {
    type State = TransportModelState;
    type Action = TransportAction;

    fn init_states(&self) -> Vec<Self::State> {
        vec![TransportModelState::new()]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        if state.produced < self.config.max_produced {
            for &size in &self.config.line_sizes {
                actions.push(TransportAction::Push { size });
            }
        }

        match state.phase {
            Phase::Connecting => {
                actions.push(TransportAction::ConnectOk);
                actions.push(TransportAction::ConnectFail);
            }
            Phase::Streaming => {
                if !state.queue.is_empty() {
                    actions.push(TransportAction::Dequeue);
                    if state.would_overflow(state.queue[0], self.config.max_packet_size) {
                        actions.push(TransportAction::DequeueWriteFail);
                    }
                }
                if state.frame_lines > 0 {
                    actions.push(TransportAction::Tick);
                    actions.push(TransportAction::TickWriteFail);
                }
            }
            Phase::Waiting => {
                if !state.queue.is_empty() {
                    actions.push(TransportAction::Discard);
                }
                actions.push(TransportAction::BackoffElapsed);
            }
            Phase::Closed => return,
        }

        actions.push(TransportAction::Close { flush_ok: true });
        if state.phase == Phase::Streaming {
            actions.push(TransportAction::Close { flush_ok: false });
        }
    }

    fn next_state(&self, state: &Self::State, action: Self::Action) -> Option<Self::State> {
        let mut next = state.clone();
        let max = self.config.max_packet_size;

        match action {
            TransportAction::Push { size } => {
                next.produced += 1;
                if next.phase == Phase::Closed || next.queue.len() >= self.config.queue_capacity {
                    next.dropped += 1;
                } else {
                    next.queue.push(size);
                    next.enqueued += 1;
                }
            }
            TransportAction::ConnectOk => next.phase = Phase::Streaming,
            TransportAction::ConnectFail => next.phase = Phase::Waiting,
            TransportAction::Dequeue => {
                let size = next.queue.remove(0);
                if next.would_overflow(size, max) {
                    next.send_frame(max);
                }
                next.append(size);
            }
            TransportAction::DequeueWriteFail => {
                next.queue.remove(0);
                next.fail_frame();
                next.discarded += 1;
                next.phase = Phase::Waiting;
            }
            TransportAction::Tick => next.send_frame(max),
            TransportAction::TickWriteFail => {
                next.fail_frame();
                next.phase = Phase::Waiting;
            }
            TransportAction::Discard => {
                next.queue.remove(0);
                next.discarded += 1;
            }
            TransportAction::BackoffElapsed => next.phase = Phase::Connecting,
            TransportAction::Close { flush_ok } => {
                let connected = next.phase == Phase::Streaming;
                let queued = std::mem::take(&mut next.queue);
                if connected && flush_ok {
                    for size in queued {
                        if next.would_overflow(size, max) {
                            next.send_frame(max);
                        }
                        next.append(size);
                    }
                    if next.frame_lines > 0 {
                        next.send_frame(max);
                    }
                } else {
                    next.fail_frame();
                    next.discarded += queued.len();
                }
                next.phase = Phase::Closed;
            }
        }

        Some(next)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        type State = TransportModelState;
        vec![
            Property::always("queue_bounded", |model: &TransportModel, state: &State| {
                state.queue.len() <= model.config.queue_capacity
            }),
            Property::always("frame_bounded", |model: &TransportModel, state: &State| {
                state.frame_bytes <= model.config.max_packet_size || state.frame_lines == 1
            }),
            Property::always(
                "no_oversize_multi_line_frames",
                |_: &TransportModel, state: &State| state.oversize_frames == 0,
            ),
            Property::always("lines_conserved", |_: &TransportModel, state: &State| {
                state.enqueued
                    == state.sent_lines + state.discarded + state.queue.len() + state.frame_lines
                    && state.produced == state.enqueued + state.dropped
            }),
            Property::always("closed_terminal", |_: &TransportModel, state: &State| {
                state.phase != Phase::Closed || (state.queue.is_empty() && state.frame_lines == 0)
            }),
            Property::sometimes("lines_delivered", |_: &TransportModel, state: &State| {
                state.sent_lines > 0
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(
        model: &TransportModel,
        state: &TransportModelState,
        action: TransportAction,
    ) -> TransportModelState {
        model.next_state(state, action).unwrap()
    }

    #[test]
    fn test_push_drops_when_full() {
        let model = TransportModel::new();
        let mut state = TransportModelState::new();
        for _ in 0..3 {
            state = apply(&model, &state, TransportAction::Push { size: 1 });
        }
        assert_eq!(state.queue.len(), 2);
        assert_eq!(state.dropped, 1);
    }

    #[test]
    fn test_overflow_flushes_before_append() {
        let model = TransportModel::new();
        let mut state = apply(&model, &TransportModelState::new(), TransportAction::ConnectOk);
        state = apply(&model, &state, TransportAction::Push { size: 3 });
        state = apply(&model, &state, TransportAction::Push { size: 3 });
        state = apply(&model, &state, TransportAction::Dequeue);
        state = apply(&model, &state, TransportAction::Dequeue);

        assert_eq!(state.sent_lines, 1);
        assert_eq!(state.frame_bytes, 3);
    }

    #[test]
    fn test_write_failure_discards_frame_and_line() {
        let model = TransportModel::new();
        let mut state = apply(&model, &TransportModelState::new(), TransportAction::ConnectOk);
        state = apply(&model, &state, TransportAction::Push { size: 3 });
        state = apply(&model, &state, TransportAction::Dequeue);
        state = apply(&model, &state, TransportAction::Push { size: 3 });
        state = apply(&model, &state, TransportAction::DequeueWriteFail);

        assert_eq!(state.phase, Phase::Waiting);
        assert_eq!(state.discarded, 2);
        assert_eq!(state.frame_lines, 0);
    }

    #[test]
    fn test_close_while_waiting_discards() {
        let model = TransportModel::new();
        let mut state = apply(&model, &TransportModelState::new(), TransportAction::ConnectFail);
        state = apply(&model, &state, TransportAction::Push { size: 1 });
        state = apply(&model, &state, TransportAction::Close { flush_ok: true });

        assert_eq!(state.phase, Phase::Closed);
        assert_eq!(state.discarded, 1);
        state = apply(&model, &state, TransportAction::Push { size: 1 });
        assert_eq!(state.dropped, 1);
    }

    #[test]
    fn test_single_line_queue_still_conserves() {
        let model = TransportModel::with_config(TransportModelConfig {
            queue_capacity: 1,
            max_packet_size: 2,
            line_sizes: vec![2],
            max_produced: 3,
        });
        let mut state = apply(&model, &TransportModelState::new(), TransportAction::ConnectOk);
        for _ in 0..2 {
            state = apply(&model, &state, TransportAction::Push { size: 2 });
        }
        state = apply(&model, &state, TransportAction::Dequeue);
        state = apply(&model, &state, TransportAction::Close { flush_ok: true });

        assert_eq!(state.enqueued, 1);
        assert_eq!(state.dropped, 1);
        assert_eq!(state.sent_lines, 1);
        assert_eq!(state.phase, Phase::Closed);
    }

    #[test]
    #[ignore] // Run with: cargo test stateright_transport -- --ignored --nocapture
    fn stateright_transport_model_check() {
        use stateright::Checker;

        let model = TransportModel::new();
        let checker = model.checker().spawn_bfs().join();

        println!("States explored: {}", checker.unique_state_count());

        checker.assert_properties();

        println!("Model check passed! All transport invariants hold.");
    }
}
