//! Compare two captured PPM dumps and write their per-channel absolute
//! difference as a third PPM, reporting how many pixels differ.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use lumina::render_system::capture::ppm;

#[derive(Parser)]
#[command(about = "Diff two PPM captures")]
struct Cli {
    first: PathBuf,
    second: PathBuf,
    /// Output difference image.
    output: PathBuf,

    /// Per-channel tolerance below which a difference is ignored.
    #[arg(short, long, default_value_t = 0)]
    tolerance: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(differing) => {
            println!("{differing} differing pixels");
            if differing == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<u64, Box<dyn std::error::Error>> {
    let (width, height, first) = ppm::read(&cli.first)?;
    let (second_width, second_height, second) = ppm::read(&cli.second)?;
    if (width, height) != (second_width, second_height) {
        return Err(format!(
            "size mismatch: {width}x{height} vs {second_width}x{second_height}"
        )
        .into());
    }

    let mut output = BufWriter::new(File::create(&cli.output)?);
    write!(output, "P6\n{width}\n{height}\n255\n")?;

    let mut differing = 0u64;
    for (a, b) in first.chunks_exact(3).zip(second.chunks_exact(3)) {
        let delta = [
            a[0].abs_diff(b[0]),
            a[1].abs_diff(b[1]),
            a[2].abs_diff(b[2]),
        ];
        if delta.iter().any(|&d| d > cli.tolerance) {
            differing += 1;
        }
        output.write_all(&delta)?;
    }
    output.flush()?;

    Ok(differing)
}
