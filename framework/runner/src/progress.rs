use std::cmp::min;
use std::fmt::Write;
use std::time::{Duration, Instant};

use crosswind_core::prelude::ShutdownListener;
use indicatif::{ProgressBar, ProgressState, ProgressStyle};

/// Displays a progress bar while the run is in progress to show the user how long is left.
///
/// The bar covers the planned runtime of the scenarios. Graceful stop time at the end of the run is
/// not included, the bar just stays full while iterations finish.
pub(crate) fn start_progress(
    planned_runtime: Duration,
    shutdown_listener: ShutdownListener,
) -> anyhow::Result<()> {
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {planned_runtime}]",
    )?
    .with_key("planned_runtime", {
        let hours = planned_runtime.as_secs() / 3600;
        let minutes = (planned_runtime.as_secs() % 3600) / 60;
        let seconds = planned_runtime.as_secs() % 60;
        move |_state: &ProgressState, w: &mut dyn Write| {
            let _ = write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds);
        }
    })
    .progress_chars("#>-");

    std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            let start_time = Instant::now();
            let pb = ProgressBar::new(planned_runtime.as_secs());
            pb.set_style(style);

            loop {
                if shutdown_listener.should_shutdown() {
                    log::trace!("Progress thread shutting down");
                    pb.finish_and_clear();
                    break;
                }

                let new = min(start_time.elapsed().as_secs(), planned_runtime.as_secs());
                pb.set_position(new);
                std::thread::sleep(Duration::from_millis(500));
            }
        })?;

    Ok(())
}
