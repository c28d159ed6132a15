//! dice-physics entry point
//!
//! Rolls simulated dice from the command line and prints the settled values.

#[cfg(not(target_arch = "wasm32"))]
mod cli {
    use std::path::PathBuf;
    use std::process;

    use clap::Parser;
    use dice_physics::{
        DiceError, DiceResult, DiceSimulation, ReconcilePolicy, RollOutcome, RollRequest, Settings,
        ThrowMode,
    };

    #[derive(Parser)]
    #[command(
        name = "dice-physics",
        about = "Roll physically simulated polyhedral dice",
        version
    )]
    struct Cli {
        /// Dice notation, e.g. `2d6+3` or `d20 d%`
        #[arg(default_value = "d20", allow_negative_numbers = true)]
        notation: Vec<String>,

        /// Seed for a reproducible roll
        #[arg(long)]
        seed: Option<u64>,

        /// Reconciliation policy: physics, expected or log
        #[arg(long)]
        policy: Option<String>,

        /// Place dice at rest instead of throwing them
        #[arg(long)]
        instant: bool,

        /// Expected values in dice order, comma separated
        #[arg(long, value_delimiter = ',')]
        expect: Vec<u32>,

        /// Settings file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Throw force multiplier
        #[arg(long, default_value_t = 1.0)]
        force: f32,

        /// Spin multiplier
        #[arg(long, default_value_t = 1.0)]
        spin: f32,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    }

    pub fn main() {
        env_logger::init();
        let cli = Cli::parse();
        if let Err(e) = run(cli) {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }

    /// Join separate arguments into one expression, `d20 -1` included
    fn join_notation(parts: &[String]) -> String {
        let mut joined = String::new();
        for part in parts.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            if !joined.is_empty() && !part.starts_with(['+', '-']) {
                joined.push('+');
            }
            joined.push_str(part);
        }
        joined
    }

    fn run(cli: Cli) -> DiceResult<()> {
        let mut settings = match &cli.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        if let Some(name) = &cli.policy {
            settings.policy = ReconcilePolicy::from_str(name)
                .ok_or_else(|| DiceError::InvalidConfig(format!("unknown policy '{name}'")))?;
        }

        let mut request = RollRequest::parse(&join_notation(&cli.notation))?;
        if !cli.expect.is_empty() {
            if cli.expect.len() != request.dice.len() {
                return Err(DiceError::InvalidConfig(format!(
                    "{} expected values for {} dice",
                    cli.expect.len(),
                    request.dice.len()
                )));
            }
            for (die, &value) in request.dice.iter_mut().zip(&cli.expect) {
                die.expected_value = Some(value);
            }
        }
        request.throw.force = cli.force;
        request.throw.spin = cli.spin;
        request.throw.seed = cli.seed;
        if cli.instant {
            request.mode = ThrowMode::Instant;
        }

        let mut simulation = DiceSimulation::new(settings)?;
        let outcome = simulation.roll(request)?;

        if cli.json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        } else {
            print_outcome(&simulation, &outcome);
        }
        Ok(())
    }

    fn print_outcome(simulation: &DiceSimulation, outcome: &RollOutcome) {
        let diagnostics = &outcome.diagnostics;
        for (i, (&die_type, &value)) in outcome
            .die_types
            .iter()
            .zip(&outcome.per_die_values)
            .enumerate()
        {
            let label = simulation.registry().get(die_type).label(value);
            let mut notes = Vec::new();
            if diagnostics.physics_values[i] != value {
                notes.push(format!("physics {}", diagnostics.physics_values[i]));
            }
            if diagnostics.nudged[i] {
                notes.push("nudged".to_string());
            }
            if diagnostics.timed_out[i] {
                notes.push("timed out".to_string());
            }
            let notes = if notes.is_empty() {
                String::new()
            } else {
                format!("  ({})", notes.join(", "))
            };
            println!(
                "{die_type:>5}: {label:>3}  settled {:.2}s{notes}",
                outcome.settle_durations[i]
            );
        }
        if outcome.modifier != 0 {
            println!("  mod: {:+}", outcome.modifier);
        }
        println!("total: {}", outcome.total);
        for d in &diagnostics.divergences {
            println!(
                "divergence: die {} showed {} but {} was expected",
                d.die_index, d.physics_value, d.expected_value
            );
        }
        println!("seed {}, {} steps", diagnostics.seed, diagnostics.steps);
    }

}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    cli::main();
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The library is driven by the host page on the web
}
