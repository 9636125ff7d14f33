//! FF0F - IF - Interrupt Flag (R/W)
//! FFFF - IE - Interrupt Enable (R/W)
//!
//! Bit 0: V-Blank  (INT 40h)
//! Bit 1: LCD STAT (INT 48h)
//! Bit 2: Timer    (INT 50h)
//! Bit 3: Serial   (INT 58h)
//! Bit 4: Joypad   (INT 60h)
//!
//! An interrupt fires when `IME ∧ (IE & IF)` is nonzero; the serviced interrupt is the
//! lowest-numbered bit set in both registers. This controller is shared (via `Rc<RefCell<_>>`)
//! between the `Mmu`, `Timer`, `Ppu` and `Joypad`, who each call `request()` when their
//! condition fires, and the `Cpu`, who polls `pending()` once per step.

use bitflags::bitflags;

bitflags!(
    struct Mask: u8 {
        const VBLANK   = 0b0000_0001;
        const LCD_STAT = 0b0000_0010;
        const TIMER    = 0b0000_0100;
        const SERIAL   = 0b0000_1000;
        const JOYPAD   = 0b0001_0000;
    }
);

/// The five interrupt sources, in their hardware priority order (lowest bit wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    VBlank,
    LcdStat,
    Timer,
    Serial,
    Joypad,
}

impl Interrupt {
    /// The interrupt vector address this source dispatches to (`0x0040 + index*8`).
    pub fn vector(self) -> u16 {
        0x0040 + (self.index() as u16) * 8
    }

    fn index(self) -> u8 {
        match self {
            Interrupt::VBlank => 0,
            Interrupt::LcdStat => 1,
            Interrupt::Timer => 2,
            Interrupt::Serial => 3,
            Interrupt::Joypad => 4,
        }
    }

    fn mask(self) -> Mask {
        match self {
            Interrupt::VBlank => Mask::VBLANK,
            Interrupt::LcdStat => Mask::LCD_STAT,
            Interrupt::Timer => Mask::TIMER,
            Interrupt::Serial => Mask::SERIAL,
            Interrupt::Joypad => Mask::JOYPAD,
        }
    }

    fn from_index(index: u32) -> Self {
        match index {
            0 => Interrupt::VBlank,
            1 => Interrupt::LcdStat,
            2 => Interrupt::Timer,
            3 => Interrupt::Serial,
            4 => Interrupt::Joypad,
            _ => unreachable!("interrupt index out of range"),
        }
    }
}

pub struct InterruptController {
    if_: Mask,
    ie: Mask,
}

impl InterruptController {
    pub fn new() -> Self {
        Self {
            if_: Mask::empty(),
            ie: Mask::empty(),
        }
    }

    /// Request (latch) an interrupt. Called by the owning subsystem when its condition
    /// fires; does not itself check `IE` or `IME`.
    pub fn request(&mut self, interrupt: Interrupt) {
        self.if_.insert(interrupt.mask());
    }

    /// The lowest-indexed interrupt that is both requested and enabled, if any.
    pub fn pending(&self) -> Option<Interrupt> {
        let ready = self.if_.bits() & self.ie.bits();
        if ready == 0 {
            None
        } else {
            Some(Interrupt::from_index(ready.trailing_zeros()))
        }
    }

    /// Clear a request, done by the CPU once it begins servicing it.
    pub fn clear(&mut self, interrupt: Interrupt) {
        self.if_.remove(interrupt.mask());
    }

    /// Raw `FF0F` read. The unimplemented top three bits read back as 1, matching
    /// hardware convention.
    pub fn raw_if(&self) -> u8 {
        self.if_.bits() | 0b1110_0000
    }

    pub fn set_raw_if(&mut self, value: u8) {
        self.if_ = Mask::from_bits_truncate(value);
    }

    pub fn raw_ie(&self) -> u8 {
        self.ie.bits()
    }

    pub fn set_raw_ie(&mut self, value: u8) {
        self.ie = Mask::from_bits_truncate(value);
    }
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_picks_lowest_indexed_bit() {
        let mut ic = InterruptController::new();
        ic.set_raw_ie(0xFF);
        ic.request(Interrupt::Timer);
        ic.request(Interrupt::VBlank);
        assert_eq!(ic.pending(), Some(Interrupt::VBlank));
    }

    #[test]
    fn disabled_interrupt_is_not_pending() {
        let mut ic = InterruptController::new();
        ic.request(Interrupt::Timer);
        assert_eq!(ic.pending(), None);
    }

    #[test]
    fn clear_removes_only_that_bit() {
        let mut ic = InterruptController::new();
        ic.set_raw_ie(0xFF);
        ic.request(Interrupt::Timer);
        ic.request(Interrupt::Serial);
        ic.clear(Interrupt::Timer);
        assert_eq!(ic.pending(), Some(Interrupt::Serial));
    }

    #[test]
    fn vectors_match_hardware_addresses() {
        assert_eq!(Interrupt::VBlank.vector(), 0x0040);
        assert_eq!(Interrupt::LcdStat.vector(), 0x0048);
        assert_eq!(Interrupt::Timer.vector(), 0x0050);
        assert_eq!(Interrupt::Serial.vector(), 0x0058);
        assert_eq!(Interrupt::Joypad.vector(), 0x0060);
    }

    #[test]
    fn if_read_has_top_bits_set() {
        let ic = InterruptController::new();
        assert_eq!(ic.raw_if() & 0b1110_0000, 0b1110_0000);
    }
}
