use console::{Emoji, style};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::asset::GeneratedAsset;
use crate::phase::{Phase, Stage};
use crate::ui::icons::{CHECK, CLOCK, CROSS, DNA, FACE, GEAR, SPARKLE, WARN};

/// Terminal UI for a stage call, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Stage bar: how far the workflow is through its three stages
/// - Call bar: spinner for the synthesis call in flight
pub struct ForgeUI {
    multi: MultiProgress,
    stage_bar: ProgressBar,
    call_bar: ProgressBar,
    verbose: bool,
}

impl ForgeUI {
    pub fn new(verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let stage_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:30.magenta/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let stage_bar = multi.add(ProgressBar::new(STAGE_COUNT));
        stage_bar.set_style(stage_style);
        stage_bar.set_prefix("Stages");

        let call_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let call_bar = multi.add(ProgressBar::new_spinner());
        call_bar.set_style(call_style);
        call_bar.set_prefix(" Synth");

        Self {
            multi,
            stage_bar,
            call_bar,
            verbose,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Position the stage bar for `phase`.
    pub fn show_phase(&self, phase: Phase) {
        self.stage_bar.set_position(stages_done(phase));
        self.stage_bar
            .set_message(format!("{}", style(phase.as_str()).yellow()));
    }

    /// Start the spinner for a synthesis call.
    pub fn start_stage(&self, stage: Stage, model: &str) {
        self.stage_bar.set_message(format!(
            "{}{}",
            stage_icon(stage),
            style(stage.label()).yellow().bold()
        ));
        self.call_bar.set_message(format!(
            "Synthesizing with {} {}",
            style(model).cyan(),
            style("(starting...)").dim()
        ));
        self.call_bar.enable_steady_tick(Duration::from_millis(100));
        if self.verbose {
            self.print_line(format!(
                "    {} {} via {}",
                style("→").dim(),
                style(stage.operation()).dim(),
                style(model).dim()
            ));
        }
    }

    /// Refresh the spinner with wall-clock elapsed time.
    ///
    /// Intended to be called from a periodic timer task.
    pub fn update_elapsed(&self, elapsed: Duration) {
        self.call_bar.set_message(format!(
            "Synthesizing {}",
            style(format!("({})", format_elapsed(elapsed))).dim()
        ));
    }

    pub fn stage_complete(&self, stage: Stage, elapsed: Duration) {
        self.call_bar.finish_with_message(format!(
            "{} {} complete {}{}",
            CHECK,
            stage.label(),
            CLOCK,
            format_elapsed(elapsed)
        ));
        self.stage_bar.set_position(stages_done(stage.phase()) + 1);
    }

    pub fn stage_failed(&self, stage: Stage, error: &str) {
        self.call_bar.abandon_with_message(format!(
            "{} {} failed: {}",
            CROSS,
            stage.label(),
            style(error).red()
        ));
    }

    /// One line per new gear asset.
    pub fn show_asset(&self, asset: &GeneratedAsset) {
        let parent = asset
            .parent_id
            .map(|p| p.short())
            .unwrap_or_else(|| "identity".to_string());
        self.print_line(format!(
            "    {} {} step {} ← {} {}",
            SPARKLE,
            style(asset.id.short()).cyan().bold(),
            asset.evolution_step,
            style(parent).dim(),
            style(&asset.prompt).italic()
        ));
    }

    pub fn show_warning(&self, msg: &str) {
        self.print_line(format!("    {} {}", WARN, style(msg).yellow()));
    }

    /// Clear both bars.
    pub fn finish(&self) {
        self.stage_bar.finish_and_clear();
        if !self.call_bar.is_finished() {
            self.call_bar.finish_and_clear();
        }
    }
}

const STAGE_COUNT: u64 = 3;

fn stages_done(phase: Phase) -> u64 {
    match phase {
        Phase::Intake | Phase::Extraction => 0,
        Phase::Identity => 1,
        Phase::Gear => 2,
    }
}

pub fn stage_icon(stage: Stage) -> Emoji<'static, 'static> {
    match stage {
        Stage::Extraction => DNA,
        Stage::Identity => FACE,
        Stage::Gear => GEAR,
    }
}

/// `Xs`, or `Xm Ys` from one minute up.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
