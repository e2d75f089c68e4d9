//! Lantern Demo Viewer
//!
//! Renders a small lit scene (textured cube, ground plane, sky dome) through the
//! Lantern frame pipeline: three frames in flight, batched per-frame uploads, and
//! swapchain readback for screenshots.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p lantern-viewer -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! ### Screenshot options
//! - `-S, --screenshot`: Enable screenshot capture mode
//! - `-o, --output <PATTERN>`: Output path pattern (use `{}` for frame number)
//! - `-f, --frames <FRAMES>`: Frame indices to capture (e.g., "0,10,20" or "0-5")
//! - `--exit-after`: Exit after capturing all specified frames
//!
//! ### Display options
//! - `--size <WxH>`: Window size in pixels (default: 1280x720)
//! - `--vsync`: Present with FIFO instead of MAILBOX/IMMEDIATE
//! - `--validation`: Force-enable Vulkan validation layers
//! - `--max-frames <N>`: Exit after rendering N frames
//!
//! ### Other
//! - `-h, --help`: Print help message
//!
//! F12 captures a screenshot of the current frame at any time.
//!
//! ## Examples
//!
//! ```bash
//! # Basic viewer
//! cargo run -p lantern-viewer
//!
//! # Capture frame 0
//! cargo run -p lantern-viewer -- -S
//!
//! # Capture frames during the camera orbit and exit
//! cargo run -p lantern-viewer -- -S -f 0,60,120,180 -o orbit_{}.png --exit-after
//!
//! # Smoke test: render 300 frames and quit
//! cargo run -p lantern-viewer -- --max-frames 300
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod demo;
mod runner;

use crate::runner::ViewerConfig;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    // Check for help flag before starting the app
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    let args: Vec<String> = std::env::args().collect();
    runner::run(ViewerConfig::parse_args(&args))
}

fn print_help() {
    eprintln!(
        "Lantern Demo Viewer

USAGE:
    cargo run -p lantern-viewer -- [OPTIONS]

SCREENSHOT OPTIONS:
    -S, --screenshot        Enable screenshot capture mode
    -o, --output <PATTERN>  Output path pattern (use {{}} for frame number)
                            Default: screenshot_{{}}.png
    -f, --frames <FRAMES>   Frame indices to capture
                            Examples: \"0\" \"0,10,20\" \"0-5\" \"0,5-10,20\"
                            Default: 0
    --exit-after            Exit after capturing all specified frames

DISPLAY OPTIONS:
    --size <WxH>            Window size in pixels (default: 1280x720)
    --vsync                 Present with FIFO instead of MAILBOX/IMMEDIATE
    --validation            Force-enable Vulkan validation layers
    --max-frames <N>        Exit after rendering N frames

OTHER:
    -h, --help              Print this help message

KEYS:
    F12                     Capture a screenshot of the current frame
    Escape                  Quit

EXAMPLES:
    # Basic viewer
    cargo run -p lantern-viewer

    # Capture frame 0
    cargo run -p lantern-viewer -- -S

    # Capture frames during the camera orbit and exit
    cargo run -p lantern-viewer -- -S -f 0,60,120,180 -o orbit_{{}}.png --exit-after

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
