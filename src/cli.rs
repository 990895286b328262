use anyhow::{Result, anyhow};
use pico_args::Arguments;
use std::{
    env,
    path::PathBuf,
    process::{Command, Stdio},
};

use crate::actions::{InputSink, Key, UinputSink};
use crate::ipc::{self, DaemonOptions};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("run") => {
            let opts = parse_daemon_options(&mut pargs)?;
            ensure_no_extra(pargs)?;
            ipc::run_daemon(opts)
        }

        Some("start") => {
            let opts = parse_daemon_options(&mut pargs)?;
            ensure_no_extra(pargs)?;
            let Some(input) = &opts.input else {
                return Err(anyhow!(
                    "usage: gesturectl start --input PATH (a background daemon cannot read stdin)"
                ));
            };
            let exe = env::current_exe()?;
            let mut cmd = Command::new(exe);
            cmd.arg("run").arg("--input").arg(input);
            if opts.enabled {
                cmd.arg("--enabled");
            }
            if opts.dry_run {
                cmd.arg("--dry-run");
            }
            if let Some(p) = &opts.profile {
                cmd.arg("--profile").arg(p);
            }
            let child = cmd.stdin(Stdio::null()).spawn()?;
            println!("gesturectl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some("stop") => simple_request("shutdown"),
        Some("status") => simple_request("status"),
        Some("enable") => simple_request("enable"),
        Some("disable") => simple_request("disable"),
        Some("toggle") => simple_request("toggle"),
        Some("reload") => simple_request("reload"),
        Some("list") => simple_request("list"),
        Some("doctor") => simple_request("doctor"),

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturectl use <profile_name>"))?;
            let r = ipc::client_request(serde_json::json!({"op":"use","profile":name}))?;
            print_response(&r);
            Ok(())
        }

        Some("emit") => {
            // usage:
            //   gesturectl emit key SPACE
            //   gesturectl emit click
            //   gesturectl emit move 40 -10
            let what: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturectl emit <key|click|move> ..."))?;
            match what.as_str() {
                "key" => {
                    let name: String = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: gesturectl emit key <KEY>"))?;
                    let key = Key::parse(&name).ok_or_else(|| anyhow!("unsupported key: {name}"))?;
                    UinputSink::new()?.press_once(key);
                    println!("ok: pressed {key:?}");
                }
                "click" => {
                    let mut sink = UinputSink::new()?;
                    sink.mouse_down();
                    sink.mouse_up();
                    println!("ok: clicked left");
                }
                "move" => {
                    let usage = || anyhow!("usage: gesturectl emit move <dx> <dy>");
                    let dx: i32 = pargs.free_from_str().map_err(|_| usage())?;
                    let dy: i32 = pargs.free_from_str().map_err(|_| usage())?;
                    UinputSink::new()?.move_relative(dx, dy);
                    println!("ok: moved ({dx}, {dy})");
                }
                other => return Err(anyhow!("unknown emit kind: {other}")),
            }
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn parse_daemon_options(pargs: &mut Arguments) -> Result<DaemonOptions> {
    Ok(DaemonOptions {
        input: pargs.opt_value_from_str::<_, PathBuf>("--input")?,
        enabled: pargs.contains("--enabled"),
        dry_run: pargs.contains("--dry-run"),
        profile: pargs.opt_value_from_str("--profile")?,
    })
}

fn ensure_no_extra(pargs: Arguments) -> Result<()> {
    let rest = pargs.finish();
    if !rest.is_empty() {
        return Err(anyhow!("unexpected arguments: {rest:?}"));
    }
    Ok(())
}

fn simple_request(op: &str) -> Result<()> {
    let r = ipc::client_request(serde_json::json!({ "op": op }))?;
    print_response(&r);
    Ok(())
}

fn print_help() {
    println!(
        r#"gesturectl: webcam gestures to game input

USAGE:
  gesturectl help [command]               Show general or command-specific help
  gesturectl run [OPTIONS]                Run the daemon in the foreground
  gesturectl start --input PATH [OPTIONS] Start the daemon in the background
  gesturectl stop                         Stop the daemon (releases all held input)
  gesturectl status                       Show daemon and pipeline state
  gesturectl enable | disable | toggle    Switch input injection on or off
  gesturectl reload                       Reload active profile
  gesturectl use <name>                   Switch active profile
  gesturectl list                         List profiles
  gesturectl doctor                       Diagnose permissions and profiles
  gesturectl emit key <KEY>               Press and release one key
  gesturectl emit click                   Click the left mouse button
  gesturectl emit move <dx> <dy>          Move the mouse by a relative offset

OPTIONS (run/start):
  --input PATH      Landmark frames as JSON lines (default: stdin)
  --enabled         Inject input from the first frame (default: start disabled)
  --dry-run         Run the pipeline without touching /dev/uinput
  --profile NAME    Activate NAME before starting

TIPS:
  - Profiles: ~/.config/gesturectl/profiles
  - Active profile pointer: ~/.config/gesturectl/active
  - Log level: RUST_LOG=debug gesturectl run ...
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "run" => println!(
            "usage: gesturectl run [--input PATH] [--enabled] [--dry-run] [--profile NAME]\nRuns the daemon in the foreground, reading frames from PATH or stdin."
        ),
        "start" => println!(
            "usage: gesturectl start --input PATH [--enabled] [--dry-run] [--profile NAME]\nStarts the daemon in the background."
        ),
        "stop" => println!("usage: gesturectl stop\nReleases all held input and stops the daemon."),
        "status" => println!(
            "usage: gesturectl status\nShows enabled flag, active profile, socket, PID and the last frame's state."
        ),
        "enable" | "disable" | "toggle" => println!(
            "usage: gesturectl {cmd}\nTurns input injection on/off. Disabling releases every held key and button."
        ),
        "reload" => println!(
            "usage: gesturectl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: gesturectl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => println!("usage: gesturectl list\nLists available profiles."),
        "doctor" => println!(
            "usage: gesturectl doctor\nChecks /dev/uinput, input group membership and profile validity."
        ),
        "emit" => println!(
            "usage:\n  gesturectl emit key <KEY>\n  gesturectl emit click\n  gesturectl emit move <dx> <dy>"
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
