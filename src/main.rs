use clap::{Arg, ArgAction, Command};
use log::{error, info};

mod boot;
mod cartridge;
mod cpu;
mod error;
mod gb;
mod joypad;
mod mmu;
mod ppu;
mod timer;

fn main() {
    env_logger::init();

    let matches = Command::new("lr35902-run")
        .version("0.1.0")
        .author("m0x")
        .about("Cycle-accurate CPU/ALU/MMU core for a Sharp LR35902-based handheld console emulator.")
        .arg(
            Arg::new("testing")
                .short('t')
                .long("testing")
                .help("Skip the boot ROM and start from post-boot register state.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("rom")
                .short('r')
                .long("rom")
                .value_name("FILE")
                .help("ROM file to load.")
                .required(true),
        )
        .arg_required_else_help(true)
        .get_matches();

    let testing = matches.get_flag("testing");
    let rom_path = matches.get_one::<String>("rom").expect("required by clap");

    let mut console = match gb::GameBoy::power_on(rom_path, testing) {
        Ok(console) => console,
        Err(err) => {
            error!("{}", err);
            std::process::exit(1);
        }
    };

    info!("starting emulation loop");
    console.run();
}
