use owo_colors::OwoColorize;
use owo_colors::Style;
use phonepilot_core::SessionUpdate;
use phonepilot_protocol::StepKind;
use phonepilot_protocol::TaskOutcome;
use phonepilot_protocol::TaskVariant;
use phonepilot_protocol::VideoCapability;

/// Renders session updates as a human-readable transcript on stdout.
#[allow(clippy::print_stdout)]
pub struct EventProcessorWithHumanOutput {
    bold: Style,
    dimmed: Style,
    green: Style,
    red: Style,
    yellow: Style,
    cyan: Style,
}

#[allow(clippy::print_stdout)]
impl EventProcessorWithHumanOutput {
    pub fn create_with_ansi(with_ansi: bool) -> Self {
        if with_ansi {
            Self {
                bold: Style::new().bold(),
                dimmed: Style::new().dimmed(),
                green: Style::new().green(),
                red: Style::new().red(),
                yellow: Style::new().yellow(),
                cyan: Style::new().cyan(),
            }
        } else {
            Self {
                bold: Style::new(),
                dimmed: Style::new(),
                green: Style::new(),
                red: Style::new(),
                yellow: Style::new(),
                cyan: Style::new(),
            }
        }
    }

    pub fn print_task_started(&self, device: &str, task: &str, variant: TaskVariant) {
        let variant = match variant {
            TaskVariant::Direct => "direct",
            TaskVariant::Orchestrated => "orchestrated",
        };
        println!(
            "{} {} ({variant}) on {}",
            "task:".style(self.bold),
            task,
            device.style(self.cyan)
        );
    }

    pub fn print_capability_advisory(&self, capability: VideoCapability) {
        let reason = match capability {
            VideoCapability::Available => return,
            VideoCapability::UnsupportedPlatform => "no video decoder is configured",
            VideoCapability::InsecureContext => "the video endpoint is not in a secure context",
        };
        println!(
            "{} video display unavailable ({reason}); using screenshot polling",
            "note:".style(self.yellow)
        );
    }

    pub fn print_interrupt(&self) {
        println!("{} stopping task...", "interrupt:".style(self.yellow));
    }

    pub fn print_frame_saved(&self, path: &std::path::Path) {
        println!("{} {}", "frame:".style(self.dimmed), path.display().style(self.dimmed));
    }

    pub fn process_update(&self, update: &SessionUpdate) {
        match update {
            SessionUpdate::Thinking { text } => {
                println!("{}", text.style(self.dimmed));
            }
            SessionUpdate::Step { step } => {
                let label = match step.kind {
                    StepKind::ToolCall => "tool".style(self.cyan),
                    StepKind::ToolResult => "result".style(self.cyan),
                    StepKind::Thinking => "step".style(self.cyan),
                };
                match &step.tool_name {
                    Some(name) => {
                        println!("{label} {} {}", name.style(self.bold), step.summary)
                    }
                    None => println!("{label} {}", step.summary.style(self.bold)),
                }
            }
            SessionUpdate::AssistantMessage { content } => {
                println!("{content}");
            }
            SessionUpdate::Finished { outcome } => self.print_outcome(outcome),
        }
    }

    fn print_outcome(&self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed {
                message,
                success: true,
                steps,
            } => {
                println!(
                    "{} {message} ({steps} {})",
                    "done:".style(self.green),
                    if *steps == 1 { "step" } else { "steps" }
                );
            }
            TaskOutcome::Completed { message, .. } => {
                println!("{} {message}", "failed:".style(self.red));
            }
            TaskOutcome::Failed { message } => {
                println!("{} {message}", "error:".style(self.red));
            }
            TaskOutcome::Aborted { message } => {
                println!("{} {message}", "stopped:".style(self.yellow));
            }
        }
    }
}
