// access.rs - access levels
//
// simple-irc-bot - simple IRC bot
// Copyright (C) 2022  Mateusz Szpakowski
//
// This library is free software; you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public
// License as published by the Free Software Foundation; either
// version 2.1 of the License, or (at your option) any later version.
//
// This library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this library; if not, write to the Free Software
// Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA  02110-1301  USA

use flagset::{flags, FlagSet};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{BotError, Result};

flags! {
    pub enum Flag: u32 {
        A = 0x1,
        B = 0x2,
        C = 0x4,
        D = 0x8,
        E = 0x10,
        F = 0x20,
        G = 0x40,
        H = 0x80,
        I = 0x100,
        J = 0x200,
        K = 0x400,
        L = 0x800,
        M = 0x1000,
        N = 0x2000,
        O = 0x4000,
        P = 0x8000,
        Q = 0x10000,
        R = 0x20000,
        S = 0x40000,
        T = 0x80000,
        U = 0x100000,
        V = 0x200000,
        W = 0x400000,
        X = 0x800000,
        Z = 0x1000000,
    }
}

// letter of flag - 'y' is not used.
static FLAG_LETTERS: [(char, Flag); 25] = [
    ('a', Flag::A),
    ('b', Flag::B),
    ('c', Flag::C),
    ('d', Flag::D),
    ('e', Flag::E),
    ('f', Flag::F),
    ('g', Flag::G),
    ('h', Flag::H),
    ('i', Flag::I),
    ('j', Flag::J),
    ('k', Flag::K),
    ('l', Flag::L),
    ('m', Flag::M),
    ('n', Flag::N),
    ('o', Flag::O),
    ('p', Flag::P),
    ('q', Flag::Q),
    ('r', Flag::R),
    ('s', Flag::S),
    ('t', Flag::T),
    ('u', Flag::U),
    ('v', Flag::V),
    ('w', Flag::W),
    ('x', Flag::X),
    ('z', Flag::Z),
];

impl Flag {
    pub fn from_letter(c: char) -> Option<Flag> {
        let c = c.to_ascii_lowercase();
        FLAG_LETTERS.iter().find(|(l, _)| *l == c).map(|(_, f)| *f)
    }
}

/// Parses string of flag letters (for example "abz") into flag set.
pub fn parse_flags(letters: &str) -> Result<FlagSet<Flag>> {
    let mut out = FlagSet::default();
    for c in letters.chars() {
        match Flag::from_letter(c) {
            Some(f) => out |= f,
            None => {
                return Err(BotError::InvalidArgument(format!(
                    "Unknown access flag '{}'",
                    c
                )))
            }
        }
    }
    Ok(out)
}

pub fn flags_to_string(flags: FlagSet<Flag>) -> String {
    FLAG_LETTERS
        .iter()
        .filter(|(_, f)| flags.contains(*f))
        .map(|(l, _)| *l)
        .collect()
}

const POWER_SHIFT: u32 = 25;
const FLAGS_MASK: u32 = 0x1FF_FFFF;
pub const MAX_POWER: i32 = 100;

/// Access level: power (0-100) in high bits and flags in low 25 bits.
/// Comparisons with plain numbers compare the power only.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Access(u32);

impl Access {
    pub fn new(power: i32, flags: impl Into<FlagSet<Flag>>) -> Result<Access> {
        let mut access = Access::default();
        access.set_power(power)?;
        access.add(flags);
        Ok(access)
    }

    pub fn with_letters(power: i32, letters: &str) -> Result<Access> {
        Access::new(power, parse_flags(letters)?)
    }

    pub fn power(&self) -> u8 {
        (self.0 >> POWER_SHIFT) as u8
    }

    pub fn set_power(&mut self, power: i32) -> Result<()> {
        if !(0..=MAX_POWER).contains(&power) {
            return Err(BotError::InvalidArgument(format!(
                "Power {} must be in [0..100]",
                power
            )));
        }
        self.0 = (self.0 & FLAGS_MASK) | ((power as u32) << POWER_SHIFT);
        Ok(())
    }

    pub fn flags(&self) -> FlagSet<Flag> {
        FlagSet::new_truncated(self.0 & FLAGS_MASK)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn add(&mut self, flags: impl Into<FlagSet<Flag>>) {
        self.0 |= flags.into().bits();
    }

    pub fn add_letters(&mut self, letters: &str) -> Result<()> {
        self.add(parse_flags(letters)?);
        Ok(())
    }

    pub fn remove(&mut self, flags: impl Into<FlagSet<Flag>>) {
        self.0 &= !flags.into().bits();
    }

    // true if all given flags are set
    pub fn has(&self, flags: impl Into<FlagSet<Flag>>) -> bool {
        self.flags().contains(flags)
    }

    pub fn has_any(&self, flags: impl Into<FlagSet<Flag>>) -> bool {
        !(self.flags() & flags.into()).is_empty()
    }

    /// Merges access levels: maximal power and union of flags.
    /// Missing accesses are ignored.
    pub fn merge<'a, I>(accesses: I) -> Access
    where
        I: IntoIterator<Item = Option<&'a Access>>,
    {
        let mut power = 0;
        let mut flags = 0;
        accesses.into_iter().flatten().for_each(|a| {
            power = power.max(a.0 >> POWER_SHIFT);
            flags |= a.0 & FLAGS_MASK;
        });
        Access((power << POWER_SHIFT) | flags)
    }
}

impl PartialEq<u8> for Access {
    fn eq(&self, other: &u8) -> bool {
        self.power() == *other
    }
}

impl PartialOrd<u8> for Access {
    fn partial_cmp(&self, other: &u8) -> Option<Ordering> {
        self.power().partial_cmp(other)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "power={} flags={}",
            self.power(),
            flags_to_string(self.flags())
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_access_new() {
        let access = Access::new(20, Flag::A | Flag::C).unwrap();
        assert_eq!(20, access.power());
        assert_eq!((20 << 25) | 0b101, access.bits());
        assert!(access.has(Flag::A));
        assert!(access.has(Flag::A | Flag::C));
        assert!(!access.has(Flag::A | Flag::B));
        assert!(access.has_any(Flag::B | Flag::C));
        assert!(!access.has_any(Flag::B | Flag::D));
        assert_eq!(Access::default(), Access::new(0, FlagSet::<Flag>::default()).unwrap());
    }

    #[test]
    fn test_access_power_range() {
        let mut access = Access::default();
        assert_eq!(Ok(()), access.set_power(0));
        assert_eq!(Ok(()), access.set_power(100));
        assert_eq!(100, access.power());
        assert!(matches!(
            access.set_power(101),
            Err(BotError::InvalidArgument(_))
        ));
        assert!(matches!(
            access.set_power(-1),
            Err(BotError::InvalidArgument(_))
        ));
        assert_eq!(100, access.power());
        assert!(Access::new(200, Flag::A).is_err());
    }

    #[test]
    fn test_access_power_keeps_flags() {
        let mut access = Access::with_letters(10, "abz").unwrap();
        access.set_power(55).unwrap();
        assert_eq!(55, access.power());
        assert_eq!("abz".to_string(), flags_to_string(access.flags()));
    }

    #[test]
    fn test_access_letters() {
        let mut access = Access::default();
        access.add_letters("aB").unwrap();
        assert!(access.has(Flag::A | Flag::B));
        access.add_letters("z").unwrap();
        assert!(access.has(Flag::Z));
        assert_eq!(0, access.power());
        assert!(matches!(
            access.add_letters("y"),
            Err(BotError::InvalidArgument(_))
        ));
        assert!(matches!(
            parse_flags("a1"),
            Err(BotError::InvalidArgument(_))
        ));
        access.remove(Flag::A);
        assert!(!access.has(Flag::A));
        assert_eq!("power=0 flags=bz".to_string(), access.to_string());
    }

    #[test]
    fn test_access_compare_power() {
        let access = Access::with_letters(50, "ab").unwrap();
        assert!(access > 10);
        assert!(access < 51);
        assert!(access == 50);
        assert!(access >= 50);
        assert!(!(access > 50));
    }

    #[test]
    fn test_access_merge() {
        let a1 = Access::new(20, Flag::A).unwrap();
        let a2 = Access::new(50, Flag::B).unwrap();
        let merged = Access::merge(vec![Some(&a1), Some(&a2)]);
        assert_eq!(50, merged.power());
        assert_eq!(Flag::A | Flag::B, merged.flags());
        // commutative
        assert_eq!(merged, Access::merge(vec![Some(&a2), Some(&a1)]));
        // idempotent
        assert_eq!(a1, Access::merge(vec![Some(&a1), Some(&a1)]));
        // missing accesses are ignored
        assert_eq!(merged, Access::merge(vec![None, Some(&a1), None, Some(&a2)]));
        assert_eq!(Access::default(), Access::merge(vec![None, None]));
    }
}
