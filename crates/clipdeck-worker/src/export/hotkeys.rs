//! Deterministic hotkey assignment.
//!
//! Twelve function keys per tier, four modifier tiers. Index 48 wraps back
//! to plain F1.

use serde::Serialize;

pub const SLOTS_PER_TIER: usize = 12;
pub const TIER_COUNT: usize = 4;
pub const HOTKEY_CYCLE: usize = SLOTS_PER_TIER * TIER_COUNT;

const TIER_MODIFIERS: [(bool, bool, bool); TIER_COUNT] = [
    (false, false, false),
    (true, false, false),
    (true, true, false),
    (true, false, true),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hotkey {
    /// 0-based modifier tier
    pub tier: u8,
    /// 1-based function key number
    pub slot: u8,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Hotkey {
    /// Function key name, e.g. `F3`.
    pub fn key(&self) -> String {
        format!("F{}", self.slot)
    }

    /// Human-readable combination, e.g. `Ctrl+Shift+F3`.
    pub fn combo(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(4);
        if self.ctrl {
            parts.push("Ctrl".to_string());
        }
        if self.shift {
            parts.push("Shift".to_string());
        }
        if self.alt {
            parts.push("Alt".to_string());
        }
        parts.push(self.key());
        parts.join("+")
    }

    /// Key name as OBS expects it.
    pub fn obs_key(&self) -> String {
        format!("OBS_KEY_F{}", self.slot)
    }
}

/// Hotkey for the clip at `index` in export order.
pub fn assign_hotkey(index: usize) -> Hotkey {
    let tier = (index / SLOTS_PER_TIER) % TIER_COUNT;
    let slot = index % SLOTS_PER_TIER + 1;
    let (ctrl, shift, alt) = TIER_MODIFIERS[tier];
    Hotkey {
        tier: tier as u8,
        slot: slot as u8,
        ctrl,
        shift,
        alt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_by_index() {
        let first = assign_hotkey(0);
        assert_eq!((first.tier, first.slot), (0, 1));
        assert_eq!(first.combo(), "F1");

        let second_tier = assign_hotkey(12);
        assert_eq!((second_tier.tier, second_tier.slot), (1, 1));
        assert_eq!(second_tier.combo(), "Ctrl+F1");

        let last = assign_hotkey(47);
        assert_eq!((last.tier, last.slot), (3, 12));
        assert_eq!(last.combo(), "Ctrl+Alt+F12");

        assert_eq!(assign_hotkey(48), first);
    }

    #[test]
    fn test_first_cycle_is_unique() {
        let combos: std::collections::HashSet<String> =
            (0..HOTKEY_CYCLE).map(|i| assign_hotkey(i).combo()).collect();
        assert_eq!(combos.len(), HOTKEY_CYCLE);
    }

    #[test]
    fn test_obs_key_name() {
        let hotkey = assign_hotkey(26);
        assert_eq!(hotkey.combo(), "Ctrl+Shift+F3");
        assert_eq!(hotkey.obs_key(), "OBS_KEY_F3");
    }
}
