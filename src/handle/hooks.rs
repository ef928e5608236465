//! Per-iteration hooks.
//!
//! Idle handles run first in every iteration and keep the poll from
//! blocking. Prepare handles run right before the poll, check handles right
//! after it.

use crate::error::Result;
use crate::handle::{Handle, handle_kind};
use crate::reactor::handle::{HandleData, callback};
use crate::runtime::Loop;

macro_rules! hook {
    ($(#[$meta:meta])* $alias:ident, $kind:ident) => {
        handle_kind!(
            #[doc = concat!("Kind marker of [`", stringify!($alias), "`].")]
            $kind => $alias
        );

        $(#[$meta])*
        pub type $alias = Handle<$kind>;

        impl Handle<$kind> {
            pub fn new(event_loop: &Loop) -> Result<Self> {
                Self::init(event_loop, HandleData::Hook(None))
            }

            /// Starts calling `cb` once per loop iteration. Starting an active
            /// hook replaces its callback.
            pub fn start(&self, cb: impl FnMut() + 'static) -> Result<()> {
                self.reactor().hook_start(self.key(), callback(cb))
            }

            pub fn stop(&self) {
                self.reactor().hook_stop(self.key());
            }
        }
    };
}

hook!(
    /// Runs right before the loop polls for events.
    Prepare,
    PrepareKind
);

hook!(
    /// Runs at the start of every iteration; while active the loop never
    /// blocks.
    Idle,
    IdleKind
);

hook!(
    /// Runs right after the loop polled for events.
    Check,
    CheckKind
);
