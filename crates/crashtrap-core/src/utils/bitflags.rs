// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A macro to declare flag sets (echo sinks, line prefixes, report options).
//!
//! The generated type is a plain `Copy` wrapper over an integer with the
//! usual set operators. It serializes as its raw bits so configuration
//! files stay compact.

#[macro_export]
#[doc(hidden)]
macro_rules! crashtrap_bitflags {
    (
        $(#[$attr:meta])*
        $vis:vis struct $name:ident: $ty:ty {
            $(
                $(#[$flag_attr:meta])*
                const $flag_name:ident = $flag_value:expr;
            )*
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        $vis struct $name {
            bits: $ty,
        }

        impl $name {
            /// No flag set.
            pub const EMPTY: Self = Self { bits: 0 };

            $(
                $(#[$flag_attr])*
                pub const $flag_name: Self = Self { bits: $flag_value };
            )*

            /// Builds a set from raw bits, keeping unknown bits as they are.
            pub const fn from_bits_truncate(bits: $ty) -> Self {
                Self { bits }
            }

            /// Raw value of the set.
            pub const fn bits(&self) -> $ty {
                self.bits
            }

            /// `true` when no bit is set.
            pub const fn is_empty(&self) -> bool {
                self.bits == 0
            }

            /// `true` when every flag of `other` is set in `self`.
            pub const fn contains(&self, other: Self) -> bool {
                (self.bits & other.bits) == other.bits
            }

            /// `true` when at least one flag of `other` is set in `self`.
            pub const fn intersects(&self, other: Self) -> bool {
                (self.bits & other.bits) != 0
            }

            /// Sets the flags of `other`.
            pub fn insert(&mut self, other: Self) {
                self.bits |= other.bits;
            }

            /// Clears the flags of `other`.
            pub fn remove(&mut self, other: Self) {
                self.bits &= !other.bits;
            }

            /// Sets or clears the flags of `other` depending on `value`.
            pub fn set(&mut self, other: Self, value: bool) {
                if value {
                    self.insert(other);
                } else {
                    self.remove(other);
                }
            }

            /// Copy of `self` with `other` set.
            #[must_use]
            pub const fn with(mut self, other: Self) -> Self {
                self.bits |= other.bits;
                self
            }

            /// Copy of `self` with `other` cleared.
            #[must_use]
            pub const fn without(mut self, other: Self) -> Self {
                self.bits &= !other.bits;
                self
            }
        }

        impl core::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, other: Self) -> Self {
                Self { bits: self.bits | other.bits }
            }
        }

        impl core::ops::BitAnd for $name {
            type Output = Self;
            fn bitand(self, other: Self) -> Self {
                Self { bits: self.bits & other.bits }
            }
        }

        impl core::ops::Not for $name {
            type Output = Self;
            fn not(self) -> Self {
                Self { bits: !self.bits }
            }
        }

        impl core::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, other: Self) {
                self.bits |= other.bits;
            }
        }

        impl core::ops::BitAndAssign for $name {
            fn bitand_assign(&mut self, other: Self) {
                self.bits &= other.bits;
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                let mut rest = self.bits;
                let mut wrote = false;
                write!(f, "{}(", stringify!($name))?;
                $(
                    if ($flag_value != 0) && (rest & $flag_value) == $flag_value {
                        if wrote {
                            f.write_str(" | ")?;
                        }
                        f.write_str(stringify!($flag_name))?;
                        rest &= !$flag_value;
                        wrote = true;
                    }
                )*
                if rest != 0 {
                    if wrote {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{:#x}", rest)?;
                    wrote = true;
                }
                if !wrote {
                    f.write_str("EMPTY")?;
                }
                f.write_str(")")
            }
        }

        impl $crate::__serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: $crate::__serde::Serializer,
            {
                <$ty as $crate::__serde::Serialize>::serialize(&self.bits, serializer)
            }
        }

        impl<'de> $crate::__serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: $crate::__serde::Deserializer<'de>,
            {
                <$ty as $crate::__serde::Deserialize<'de>>::deserialize(deserializer)
                    .map(Self::from_bits_truncate)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::crashtrap_bitflags;

    crashtrap_bitflags! {
        /// Flags used only by these tests.
        pub struct Sinks: u8 {
            const FILE = 1 << 0;
            const STDERR = 1 << 1;
            const NET = 1 << 2;
            const LOCAL = Self::FILE.bits() | Self::STDERR.bits();
        }
    }

    #[test]
    fn test_empty_set() {
        let sinks = Sinks::default();
        assert!(sinks.is_empty());
        assert!(sinks.contains(Sinks::EMPTY));
        assert!(!sinks.intersects(Sinks::FILE));
        assert_eq!(format!("{sinks:?}"), "Sinks(EMPTY)");
    }

    #[test]
    fn test_composite_constant_expands_in_debug() {
        let sinks = Sinks::LOCAL;
        assert!(sinks.contains(Sinks::FILE));
        assert!(sinks.contains(Sinks::STDERR));
        assert!(!sinks.contains(Sinks::NET));
        assert_eq!(format!("{sinks:?}"), "Sinks(FILE | STDERR)");
    }

    #[test]
    fn test_set_and_remove() {
        let mut sinks = Sinks::FILE;
        sinks.set(Sinks::NET, true);
        assert_eq!(sinks.bits(), 0b101);
        sinks.set(Sinks::FILE, false);
        assert_eq!(sinks, Sinks::NET);
        sinks.remove(Sinks::NET);
        assert!(sinks.is_empty());
    }

    #[test]
    fn test_unknown_bits_are_kept() {
        let sinks = Sinks::from_bits_truncate(0b1001);
        assert!(sinks.contains(Sinks::FILE));
        assert_eq!(format!("{sinks:?}"), "Sinks(FILE | 0x8)");
    }

    #[test]
    fn test_operators() {
        let a = Sinks::FILE | Sinks::NET;
        assert_eq!((a & Sinks::LOCAL), Sinks::FILE);
        assert_eq!(a.without(Sinks::FILE).with(Sinks::STDERR).bits(), 0b110);
        let mut b = Sinks::LOCAL;
        b &= !Sinks::STDERR;
        assert_eq!(b, Sinks::FILE);
        b |= Sinks::NET;
        assert_eq!(b.bits(), 0b101);
    }

    #[test]
    fn test_serializes_as_bits() {
        let json = serde_json::to_string(&(Sinks::FILE | Sinks::NET)).unwrap();
        assert_eq!(json, "5");
        let back: Sinks = serde_json::from_str("3").unwrap();
        assert_eq!(back, Sinks::LOCAL);
    }
}
