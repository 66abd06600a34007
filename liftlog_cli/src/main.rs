use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use liftlog_core::*;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "liftlog")]
#[command(about = "Personal strength training and body metrics tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List workouts, newest first
    Workouts,

    /// Add, edit or remove a workout
    #[command(subcommand)]
    Workout(WorkoutCmd),

    /// Add, rename or remove an exercise
    #[command(subcommand)]
    Exercise(ExerciseCmd),

    /// Add, edit or remove a set
    #[command(subcommand)]
    Set(SetCmd),

    /// Show body metric readings
    Metrics {
        /// Only this metric (weight, body_fat, muscle_mass)
        kind: Option<MetricKind>,
    },

    /// Add, edit or remove a body metric reading
    #[command(subcommand)]
    Metric(MetricCmd),

    /// Set or clear a body metric goal
    #[command(subcommand)]
    Goal(GoalCmd),

    /// Show training statistics
    Stats {
        /// Show the session history of one exercise
        #[arg(long)]
        exercise: Option<String>,
    },

    /// Show the dashboard widgets
    Dashboard,

    /// Change the dashboard layout
    #[command(subcommand)]
    Widget(WidgetCmd),

    /// Export workouts and metrics as CSV into a directory
    Export { dir: PathBuf },
}

#[derive(Subcommand)]
enum WorkoutCmd {
    Add {
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        program: String,
        #[arg(long, default_value = "")]
        phase: String,
        /// Exercise to start the workout with (repeatable)
        #[arg(long = "exercise")]
        exercises: Vec<String>,
    },
    Edit {
        id: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        program: Option<String>,
        #[arg(long)]
        phase: Option<String>,
    },
    Rm {
        id: String,
    },
}

#[derive(Subcommand)]
enum ExerciseCmd {
    Add { workout: String, name: String },
    Rename { workout: String, exercise: String, name: String },
    Rm { workout: String, exercise: String },
}

#[derive(Subcommand)]
enum SetCmd {
    Add {
        workout: String,
        exercise: String,
        #[arg(long)]
        reps: u32,
        /// In the configured display unit
        #[arg(long)]
        weight: f64,
    },
    Edit {
        workout: String,
        exercise: String,
        set: String,
        #[arg(long)]
        reps: Option<u32>,
        #[arg(long)]
        weight: Option<f64>,
    },
    Rm {
        workout: String,
        exercise: String,
        set: String,
    },
}

#[derive(Subcommand)]
enum MetricCmd {
    Add {
        kind: MetricKind,
        /// Body weight in the configured display unit; percentages as-is
        value: f64,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Edit {
        kind: MetricKind,
        id: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        value: Option<f64>,
    },
    Rm {
        kind: MetricKind,
        id: String,
    },
}

#[derive(Subcommand)]
enum GoalCmd {
    Set {
        kind: MetricKind,
        target: f64,
        #[arg(long)]
        deadline: Option<NaiveDate>,
    },
    Clear {
        kind: MetricKind,
    },
}

#[derive(Subcommand)]
enum WidgetCmd {
    Toggle { widget: WidgetType },
    Move { widget: WidgetType, direction: MoveDirection },
    Reset,
}

#[derive(Clone, Copy, ValueEnum)]
enum MoveDirection {
    Up,
    Down,
}

impl From<MoveDirection> for Direction {
    fn from(d: MoveDirection) -> Self {
        match d {
            MoveDirection::Up => Direction::Up,
            MoveDirection::Down => Direction::Down,
        }
    }
}

/// Prints each mutation outcome as it resolves
struct PrintNotifier;

impl Notifier for PrintNotifier {
    fn notify(&self, notification: Notification) {
        if notification.is_error() {
            eprintln!("✗ {}", notification);
        } else {
            println!("✓ {}", notification);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    liftlog_core::logging::init_with_level(if cli.verbose { "debug" } else { "warn" });

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = cli.data_dir {
        config.data.data_dir = dir;
    }
    tracing::debug!("Using data directory {:?}", config.data.data_dir);

    let sessions = StaticSession::from_config(&config.session);
    let tracker = Tracker::open(&config, &sessions, Arc::new(PrintNotifier)).await?;
    let unit = tracker.weight_unit();

    let outcome = match cli.command {
        Commands::Workouts => {
            print_workouts(&tracker.workouts().workouts(), unit);
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Workout(cmd) => cmd_workout(&tracker, cmd).await,
        Commands::Exercise(cmd) => cmd_exercise(&tracker, cmd).await,
        Commands::Set(cmd) => cmd_set(&tracker, cmd, unit).await?,
        Commands::Metrics { kind } => {
            print_metrics(&tracker.metrics().metrics(), kind, unit);
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Metric(cmd) => cmd_metric(&tracker, cmd, unit).await,
        Commands::Goal(cmd) => match cmd {
            GoalCmd::Set {
                kind,
                target,
                deadline,
            } => {
                let target = tracker.metrics().metrics().series(kind).from_display(target, unit);
                tracker.metrics().set_goal(kind, target, deadline).await
            }
            GoalCmd::Clear { kind } => tracker.metrics().clear_goal(kind).await,
        },
        Commands::Stats { exercise } => {
            print_stats(&tracker.workouts().workouts(), exercise.as_deref(), unit);
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Dashboard => {
            for (_, line) in tracker.dashboard_lines() {
                println!("{}", line);
            }
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Widget(cmd) => {
            let dashboard = tracker.dashboard();
            match cmd {
                WidgetCmd::Toggle { widget } => dashboard.toggle(widget).await,
                WidgetCmd::Move { widget, direction } => {
                    dashboard.move_widget(widget, direction.into()).await
                }
                WidgetCmd::Reset => dashboard.reset().await,
            }
        }
        Commands::Export { dir } => {
            let (workouts_path, metrics_path) = export::export_all(
                &tracker.workouts().workouts(),
                &tracker.metrics().metrics(),
                &dir,
            )?;
            println!("✓ Exported workouts to {}", workouts_path.display());
            println!("✓ Exported metrics to {}", metrics_path.display());
            return Ok(ExitCode::SUCCESS);
        }
    };

    Ok(exit_code(&outcome))
}

fn exit_code(outcome: &MutationOutcome) -> ExitCode {
    match outcome {
        MutationOutcome::Committed { id } => {
            if let Some(id) = id {
                println!("  id: {}", id);
            }
            ExitCode::SUCCESS
        }
        MutationOutcome::RolledBack { .. } | MutationOutcome::Rejected { .. } => ExitCode::FAILURE,
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

async fn cmd_workout(tracker: &Tracker, cmd: WorkoutCmd) -> MutationOutcome {
    let log = tracker.workouts();
    match cmd {
        WorkoutCmd::Add {
            date,
            program,
            phase,
            exercises,
        } => {
            log.add_workout(NewWorkout {
                date: date.unwrap_or_else(today),
                program,
                phase,
                exercises: exercises
                    .into_iter()
                    .map(|name| NewExercise { name, sets: Vec::new() })
                    .collect(),
            })
            .await
        }
        WorkoutCmd::Edit {
            id,
            date,
            program,
            phase,
        } => {
            log.update_workout(&id, WorkoutPatch { date, program, phase })
                .await
        }
        WorkoutCmd::Rm { id } => log.delete_workout(&id).await,
    }
}

async fn cmd_exercise(tracker: &Tracker, cmd: ExerciseCmd) -> MutationOutcome {
    let log = tracker.workouts();
    match cmd {
        ExerciseCmd::Add { workout, name } => {
            log.add_exercise(&workout, NewExercise { name, sets: Vec::new() })
                .await
        }
        ExerciseCmd::Rename {
            workout,
            exercise,
            name,
        } => log.rename_exercise(&workout, &exercise, &name).await,
        ExerciseCmd::Rm { workout, exercise } => log.delete_exercise(&workout, &exercise).await,
    }
}

async fn cmd_set(tracker: &Tracker, cmd: SetCmd, unit: WeightUnit) -> Result<MutationOutcome> {
    let log = tracker.workouts();
    let outcome = match cmd {
        SetCmd::Add {
            workout,
            exercise,
            reps,
            weight,
        } => {
            let set = NewSet {
                reps,
                weight: unit.to_lbs(weight),
            };
            log.add_set(&workout, &exercise, set).await
        }
        SetCmd::Edit {
            workout,
            exercise,
            set,
            reps,
            weight,
        } => {
            // Unspecified fields keep their current values
            let workouts = log.workouts();
            let current = workouts
                .iter()
                .find(|w| w.id == workout)
                .and_then(|w| w.exercise(&exercise))
                .and_then(|e| e.sets.iter().find(|s| s.id == set))
                .ok_or_else(|| Error::not_found("set", set.clone()))?;
            let values = NewSet {
                reps: reps.unwrap_or(current.reps),
                weight: weight.map(|w| unit.to_lbs(w)).unwrap_or(current.weight),
            };
            log.update_set(&workout, &exercise, &set, values).await
        }
        SetCmd::Rm {
            workout,
            exercise,
            set,
        } => log.delete_set(&workout, &exercise, &set).await,
    };
    Ok(outcome)
}

async fn cmd_metric(tracker: &Tracker, cmd: MetricCmd, unit: WeightUnit) -> MutationOutcome {
    let log = tracker.metrics();
    let metrics = log.metrics();
    match cmd {
        MetricCmd::Add { kind, value, date } => {
            let value = metrics.series(kind).from_display(value, unit);
            log.add_entry(kind, date.unwrap_or_else(today), value).await
        }
        MetricCmd::Edit {
            kind,
            id,
            date,
            value,
        } => {
            let value = value.map(|v| metrics.series(kind).from_display(v, unit));
            log.update_entry(kind, &id, date, value).await
        }
        MetricCmd::Rm { kind, id } => log.delete_entry(kind, &id).await,
    }
}

fn print_workouts(workouts: &[Workout], unit: WeightUnit) {
    if workouts.is_empty() {
        println!("No workouts logged yet.");
        return;
    }
    for workout in workouts {
        let phase = if workout.phase.is_empty() {
            String::new()
        } else {
            format!(" / {}", workout.phase)
        };
        println!("{}  {}{}  [{}]", workout.date, workout.program, phase, workout.id);
        for exercise in &workout.exercises {
            println!("  {}  [{}]", exercise.name, exercise.id);
            for (idx, set) in exercise.sets.iter().enumerate() {
                println!(
                    "    {}. {} x {:.1} {}  [{}]",
                    idx + 1,
                    set.reps,
                    unit.from_lbs(set.weight),
                    unit.label(),
                    set.id
                );
            }
        }
    }
}

fn print_metrics(metrics: &BodyMetrics, only: Option<MetricKind>, unit: WeightUnit) {
    let kinds: Vec<MetricKind> = match only {
        Some(kind) => vec![kind],
        None => MetricKind::ALL.to_vec(),
    };
    for kind in kinds {
        let series = metrics.series(kind);
        println!("{} ({})", kind, series.display_label(unit));
        if series.entries.is_empty() {
            println!("  no readings");
        }
        for entry in &series.entries {
            println!(
                "  {}  {:.1}  [{}]",
                entry.date,
                series.to_display(entry.value, unit),
                entry.id
            );
        }
        if let Some(goal) = &series.goal {
            let deadline = goal
                .deadline
                .map(|d| format!(" by {}", d))
                .unwrap_or_default();
            let progress = stats::goal_progress(series)
                .map(|p| format!(" ({:.0}% there)", p))
                .unwrap_or_default();
            println!(
                "  goal: {:.1}{}{}",
                series.to_display(goal.target, unit),
                deadline,
                progress
            );
        }
    }
}

fn print_stats(workouts: &[Workout], exercise: Option<&str>, unit: WeightUnit) {
    if let Some(name) = exercise {
        let history = stats::exercise_history(workouts, name);
        if history.is_empty() {
            println!("No sessions of {}", name);
            return;
        }
        for session in &history {
            println!(
                "{}  max {:.1} {}  volume {:.0} {}",
                session.date,
                unit.from_lbs(session.max_weight),
                unit.label(),
                unit.from_lbs(session.volume),
                unit.label()
            );
        }
        if stats::is_personal_record(workouts, name) {
            println!("Latest session is a personal record!");
        }
        return;
    }

    let summary = stats::summarize(workouts);
    println!("Workouts:  {}", summary.workouts);
    println!("Exercises: {}", summary.exercises);
    println!("Sets:      {}", summary.sets);
    println!("Volume:    {:.0} {}", unit.from_lbs(summary.volume), unit.label());
    if let Some(name) = stats::most_frequent_exercise(workouts) {
        println!("Favorite:  {}", name);
    }
    for (program, count) in stats::workouts_by_program(workouts) {
        println!("Program {}: {} workouts", program, count);
    }
    let records = stats::personal_records(workouts);
    if !records.is_empty() {
        println!("Personal records: {}", records.join(", "));
    }
}
