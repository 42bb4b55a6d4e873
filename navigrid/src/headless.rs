//! Follow loop for the line protocol.
//!
//! Each stdin line is one sampling tick. The loop ends on arrival, EOF,
//! `#quit` or Ctrl-C.

use navigrid_core::headless::{
    parse_line, render_report, render_route, render_status, Command, Input, HELP,
};
use navigrid_core::NavigationSession;
use tokio::io::{AsyncBufRead, Lines};
use tracing::info;

pub async fn follow<R: AsyncBufRead + Unpin>(
    mut session: NavigationSession,
    lines: &mut Lines<R>,
) -> std::io::Result<()> {
    println!("{}", render_route(session.route()));
    println!("{}", render_status(&session.status()));
    println!("[GUIDE] {}", session.status().last_instruction);
    if session.guide_name() == "offline" {
        println!("[WARN] instruction generator unavailable, using fallback instructions");
    }

    if session.is_completed() {
        println!("[ARRIVED] {}", session.status().last_instruction);
        return Ok(());
    }

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                println!("[STATUS] interrupted at {}", session.status().current);
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        match parse_line(&line) {
            Input::Blank => {}
            Input::Command(Command::Quit) => {
                println!("Goodbye!");
                break;
            }
            Input::Command(Command::Status) => println!("{}", render_status(&session.status())),
            Input::Command(Command::Route) => println!("{}", render_route(session.route())),
            Input::Command(Command::Help) => println!("{HELP}"),
            Input::Command(Command::Unknown(word)) => {
                println!("[ERROR] Unknown command '#{word}'. Type #help for help.");
            }
            Input::Detections(detections) => {
                let report = session.tick(&detections).await;
                for out in render_report(&report) {
                    println!("{out}");
                }
                if session.is_completed() {
                    break;
                }
            }
        }
    }

    Ok(())
}
