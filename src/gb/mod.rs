//! Wires the CPU, MMU and the I/O subsystems reached through it into a runnable
//! machine, and drives the step loop the host's `main` calls into.

use log::info;

use crate::cartridge::Cartridge;
use crate::cpu::Cpu;
use crate::error::EmuError;
use crate::joypad::Button;
use crate::mmu::Mmu;

pub struct GameBoy {
    cpu: Cpu,
    mmu: Mmu,
}

impl GameBoy {
    /// Load `rom_path` and power on. When `skip_boot_rom` is set (the CLI's
    /// `--testing` flag) the CPU starts with post-boot register state and the `FF50`
    /// latch pre-written, exactly as if the boot ROM had already run to completion —
    /// this is how headless test ROMs are launched without waiting on the real boot
    /// sequence.
    pub fn power_on(rom_path: &str, skip_boot_rom: bool) -> Result<Self, EmuError> {
        let cartridge = Cartridge::load(rom_path)?;
        Self::power_on_with(cartridge, skip_boot_rom)
    }

    fn power_on_with(cartridge: Cartridge, skip_boot_rom: bool) -> Result<Self, EmuError> {
        info!(
            "cartridge {:?} loaded ({} bytes)",
            cartridge.title(),
            cartridge.rom_len()
        );

        let mut mmu = Mmu::new(cartridge);
        let mut cpu = Cpu::new(mmu.interrupts());

        if skip_boot_rom {
            cpu.skip_boot_rom();
            mmu.write8(0xFF50, 0x01);
        }

        Ok(Self { cpu, mmu })
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.mmu.set_button(button, pressed);
    }

    pub fn add_breakpoint(&mut self, addr: u16) {
        self.cpu.add_breakpoint(addr);
    }

    /// Execute exactly one CPU instruction (or idle tick) and advance every other
    /// subsystem by the same number of cycles. Returns the cycles elapsed.
    pub fn step(&mut self) -> u32 {
        let cycles = self.cpu.step(&mut self.mmu);
        self.mmu.tick(cycles);
        cycles
    }

    /// Drive the machine indefinitely. The host is responsible for deciding when to
    /// stop (a frame budget, a breakpoint hit, a test ROM's own termination
    /// convention); this core has no concept of "done" on its own.
    pub fn run(&mut self) -> ! {
        loop {
            self.step();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nop_rom() -> Cartridge {
        let mut rom = vec![0u8; 0x8000];
        rom[0x0134..0x0139].copy_from_slice(b"TEST\0");
        rom[0x0147] = 0x00;
        Cartridge::from_bytes(rom).unwrap()
    }

    #[test]
    fn power_on_with_skip_boot_rom_starts_at_0x0100() {
        let gb = GameBoy::power_on_with(nop_rom(), true).unwrap();
        assert_eq!(gb.cpu.registers().pc, 0x0100);
    }

    #[test]
    fn step_advances_pc_past_a_nop() {
        let mut gb = GameBoy::power_on_with(nop_rom(), true).unwrap();
        let cycles = gb.step();
        assert_eq!(cycles, 4);
        assert_eq!(gb.cpu.registers().pc, 0x0101);
    }
}
