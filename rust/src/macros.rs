//! Internal macros shared across the crate.
//!
//! `fatal!` and `ensure_invariant!` report structural violations through
//! `tracing` and then panic. `mod_kinds!` generates the bitwise-combinable
//! modification tags used by the level loop.

/// Report an unrecoverable internal-consistency violation and panic.
macro_rules! fatal {
    ($($arg:tt)+) => {{
        let message = format!($($arg)+);
        tracing::error!(target: "batchtree", "{}", message);
        panic!("{}", message)
    }};
}

/// Panic through `fatal!` unless `$cond` holds.
macro_rules! ensure_invariant {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            fatal!($($arg)+);
        }
    };
}

/// Define the `ModKind` tag set. Each name becomes an associated constant
/// plus an `is_<name>` accessor that tests for that bit.
macro_rules! mod_kinds {
    ($($name:ident = $bit:expr),+ $(,)?) => {
        /// Bitwise-combinable tag describing what a staged item asks of its target.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub(crate) struct ModKind(u8);

        impl ModKind {
            $(
                pub(crate) const $name: ModKind = ModKind($bit);
            )+

            paste::paste! {
                $(
                    #[allow(dead_code)]
                    pub(crate) fn [<is_ $name:lower>](self) -> bool {
                        self.0 & $bit != 0
                    }
                )+
            }

            /// True when no tag bit is set.
            pub(crate) fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl std::ops::BitOr for ModKind {
            type Output = ModKind;

            fn bitor(self, rhs: ModKind) -> ModKind {
                ModKind(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for ModKind {
            fn bitor_assign(&mut self, rhs: ModKind) {
                self.0 |= rhs.0;
            }
        }

        impl std::fmt::Debug for ModKind {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut names = Vec::new();
                $(
                    if self.0 & $bit != 0 {
                        names.push(stringify!($name));
                    }
                )+
                if names.is_empty() {
                    write!(f, "ModKind(NONE)")
                } else {
                    write!(f, "ModKind({})", names.join("|"))
                }
            }
        }
    };
}
