mod actions;
mod announce;
mod cli;
mod config;
mod driver;
mod features;
mod gestures;
mod gun;
mod ipc;
mod landmarks;
mod logging;
mod movement;
mod pointer;
mod source;
mod trigger;
mod watch;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
