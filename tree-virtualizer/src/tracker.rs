use crate::key::TreeKey;
use crate::view_item::ViewFactory;
use crate::Reflector;

/// Attachment state of the reflector with respect to its source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrackerState {
    #[default]
    NoModel,
    /// A source is attached but notifications are not applied.
    Paused,
    /// The mirror was populated; notifications are not applied yet.
    Populated,
    /// Notifications are applied incrementally.
    Tracking,
    /// Between `model_about_to_be_reset` and `model_reset`.
    Resetting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackerAction {
    Populate,
    Disable,
    Enable,
    Reset,
    Free,
    Move,
    Trim,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TrackerHandler {
    Nothing,
    Populate,
    /// Start applying notifications.
    Track,
    /// Start applying notifications after a pause, catching up on what was missed.
    Resume,
    Untrack,
    Reset,
    Free,
    Refresh,
    Trim,
    Error,
}

pub(crate) fn transition(
    state: TrackerState,
    action: TrackerAction,
) -> (TrackerState, TrackerHandler) {
    use TrackerAction as A;
    use TrackerHandler as H;
    use TrackerState as S;

    match (state, action) {
        (S::NoModel, _) => (S::NoModel, H::Nothing),

        (S::Paused, A::Populate) => (S::Populated, H::Populate),
        (S::Paused, A::Enable) => (S::Tracking, H::Resume),
        (S::Paused, A::Reset) => (S::Resetting, H::Reset),
        (S::Paused, A::Free) => (S::NoModel, H::Free),
        (S::Paused, A::Disable | A::Move | A::Trim) => (S::Paused, H::Nothing),

        (S::Populated, A::Populate) => (S::Populated, H::Populate),
        (S::Populated, A::Disable) => (S::Paused, H::Nothing),
        (S::Populated, A::Enable) => (S::Tracking, H::Track),
        (S::Populated, A::Reset) => (S::Resetting, H::Reset),
        (S::Populated, A::Free) => (S::Populated, H::Error),
        (S::Populated, A::Move) => (S::Populated, H::Refresh),
        (S::Populated, A::Trim) => (S::Populated, H::Trim),

        (S::Tracking, A::Populate) => (S::Tracking, H::Populate),
        (S::Tracking, A::Disable) => (S::Paused, H::Untrack),
        (S::Tracking, A::Enable) => (S::Tracking, H::Nothing),
        (S::Tracking, A::Reset) => (S::Resetting, H::Reset),
        (S::Tracking, A::Free) => (S::Tracking, H::Error),
        (S::Tracking, A::Move) => (S::Tracking, H::Refresh),
        (S::Tracking, A::Trim) => (S::Tracking, H::Trim),

        (S::Resetting, A::Populate) => (S::Populated, H::Populate),
        (S::Resetting, A::Free) => (S::NoModel, H::Free),
        (S::Resetting, A::Reset) => (S::Resetting, H::Error),
        (S::Resetting, A::Disable | A::Enable | A::Move | A::Trim) => {
            (S::Resetting, H::Nothing)
        }
    }
}

impl<K: TreeKey, F: ViewFactory<K>> Reflector<K, F> {
    /// Drives the tracker state machine.
    pub(crate) fn perform_tracker(&mut self, action: TrackerAction) -> TrackerState {
        let prev = self.tracker;
        let (next, handler) = transition(prev, action);
        if next != prev {
            vdebug!(?prev, ?next, ?action, "tracker transition");
        }
        self.tracker = next;
        match handler {
            TrackerHandler::Nothing => {}
            TrackerHandler::Populate => {
                self.clear_mirror();
                self.refresh();
            }
            TrackerHandler::Track => self.missed = false,
            TrackerHandler::Resume => {
                if self.missed || self.window_top.is_none() {
                    self.clear_mirror();
                }
                self.missed = false;
                self.refresh();
            }
            TrackerHandler::Untrack => {}
            TrackerHandler::Reset => self.clear_mirror(),
            TrackerHandler::Free => {
                self.clear_mirror();
                self.source = None;
            }
            TrackerHandler::Refresh => self.refresh(),
            TrackerHandler::Trim => self.trim(),
            TrackerHandler::Error => {
                self.tracker = prev;
                self.heal();
            }
        }
        self.tracker
    }

    /// Recovers from an out-of-order action: drop the mirror and start tracking again.
    fn heal(&mut self) {
        vwarn!(state = ?self.tracker, "tracker out of sync, rebuilding the mirror");
        if self.healing {
            self.clear_mirror();
            self.tracker = if self.source.is_some() {
                TrackerState::Paused
            } else {
                TrackerState::NoModel
            };
            return;
        }
        self.healing = true;
        self.perform_tracker(TrackerAction::Disable);
        if self.tracker == TrackerState::Resetting {
            self.clear_mirror();
            self.tracker = TrackerState::Paused;
        } else {
            self.perform_tracker(TrackerAction::Reset);
            self.tracker = TrackerState::Paused;
        }
        if self.options.enabled {
            self.perform_tracker(TrackerAction::Enable);
        }
        self.healing = false;
    }

    /// Whether notifications are applied right now. Records a miss otherwise.
    pub(crate) fn tracking(&mut self) -> bool {
        if self.tracker == TrackerState::Tracking {
            return true;
        }
        if self.tracker != TrackerState::NoModel {
            self.missed = true;
        }
        false
    }
}
