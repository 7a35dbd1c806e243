use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use serde_json::json;
use stngpe::{
    AdaptiveController, AdaptiveDeadbandController, AdaptiveFilterController, AmplitudeIncrease,
    Constants, Controller, MemoryLessController, MidIncrease, ProportionalController,
    ProportionalIntegralController, SimulationConfig, State, Trajectory, ZeroController,
    analysis::{self, Band},
    controller::DEFAULT_TAIL_LEN,
    render, run_simulation,
};

use crate::app::scenario::Scenario;

mod scenario;

/// Window the summary amplitudes are measured over, ms
const SUMMARY_TAIL: f64 = 500.0;

#[derive(Parser)]
#[command(author, version, about = "Delayed STN/GPe loop under closed-loop stimulation")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one simulation and log a summary
    Run(RunArgs),
    /// Compare the controllers on a published setup
    Scenario {
        #[arg(value_enum)]
        which: ScenarioKind,
    },
    /// Write the wiring diagram of the loop
    Topology {
        /// Constants as JSON (object with named fields, or an array of 20)
        #[arg(long)]
        constants: Option<PathBuf>,
        /// Render a PNG with Graphviz instead of printing DOT
        #[arg(long, requires = "output")]
        png: bool,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ScenarioKind {
    /// Oscillation produced by the loop itself
    Endogenous,
    /// Oscillation imposed by a 20 Hz cortical drive
    Cortical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ControllerKind {
    Zero,
    Proportional,
    Pi,
    Adaptive,
    AdaptiveFilter,
    Deadband,
    MemoryLess,
}

/// Hyperparameters of every controller; each kind reads the ones it needs.
#[derive(Args, Clone, Debug)]
pub struct ControllerParams {
    /// Proportional gain, also the memory-less gain
    #[arg(long, default_value_t = 2.0)]
    pub gain: f64,
    #[arg(long, default_value_t = 0.5)]
    pub integral_gain: f64,
    /// Memory-less STN weight
    #[arg(long, default_value_t = 3.0)]
    pub beta: f64,
    /// Leak of θ
    #[arg(long, default_value_t = 0.1)]
    pub sigma: f64,
    /// Time constant of θ, ms
    #[arg(long, default_value_t = 75.0)]
    pub tau_theta: f64,
    /// Amplitude window of the filtered adaptive law, ms
    #[arg(long, default_value_t = DEFAULT_TAIL_LEN)]
    pub tail_len: f64,
    /// Amplitude below which the deadband law is silent
    #[arg(long, default_value_t = 1.0)]
    pub threshold: f64,
    #[arg(long, default_value_t = -100.0, allow_hyphen_values = true)]
    pub mu_min: f64,
    #[arg(long, default_value_t = 100.0, allow_hyphen_values = true)]
    pub mu_max: f64,
    /// Deadband window in samples
    #[arg(long, default_value_t = 1000)]
    pub deadband_tail: usize,
    /// Fixed reference for the proportional law instead of the tracked baseline
    #[arg(long, allow_hyphen_values = true)]
    pub equilibrium: Option<f64>,
}

impl ControllerKind {
    pub fn build(self, params: &ControllerParams, dt: f64) -> stngpe::Result<Box<dyn Controller>> {
        let p = params;
        Ok(match self {
            ControllerKind::Zero => Box::new(ZeroController),
            ControllerKind::Proportional => {
                let c = ProportionalController::new(p.gain, dt)?;
                match p.equilibrium {
                    Some(eq) => Box::new(c.with_equilibrium(eq)),
                    None => Box::new(c),
                }
            }
            ControllerKind::Pi => {
                Box::new(ProportionalIntegralController::new(p.gain, p.integral_gain, dt)?)
            }
            ControllerKind::Adaptive => Box::new(AdaptiveController::new(p.sigma, p.tau_theta, dt)?),
            ControllerKind::AdaptiveFilter => Box::new(AdaptiveFilterController::new(
                p.sigma,
                p.tau_theta,
                dt,
                p.tail_len,
            )?),
            ControllerKind::Deadband => Box::new(AdaptiveDeadbandController::new(
                p.sigma,
                p.tau_theta,
                p.threshold,
                (p.mu_min, p.mu_max),
                p.deadband_tail,
            )?),
            ControllerKind::MemoryLess => Box::new(MemoryLessController::new(p.gain, p.beta, dt)?),
        })
    }
}

#[derive(Args)]
struct RunArgs {
    #[arg(long, value_enum, default_value_t = ControllerKind::Zero)]
    controller: ControllerKind,
    #[command(flatten)]
    params: ControllerParams,

    /// Constants as JSON (object with named fields, or an array of 20)
    #[arg(long)]
    constants: Option<PathBuf>,
    /// Simulated time after the padding, ms
    #[arg(long, default_value_t = 1000.0)]
    time: f64,
    /// Integration step, ms
    #[arg(long, default_value_t = 0.01)]
    dt: f64,
    /// Settling time simulated first, ms
    #[arg(long, default_value_t = 0.0)]
    pad: f64,
    #[arg(long, default_value_t = 200.0, allow_hyphen_values = true)]
    control_start: f64,
    #[arg(long, default_value_t = 40.0, allow_hyphen_values = true)]
    init_theta: f64,

    /// Onset of the afferent step increases, ms
    #[arg(long, default_value_t = 750.0)]
    increase_onset: f64,
    #[arg(long, allow_hyphen_values = true)]
    cortical_increase: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    striatal_increase: Option<f64>,
    /// Extra cortical oscillation amplitude from the onset on
    #[arg(long)]
    amplitude_increase: Option<f64>,

    /// Write the trajectory after the padding as JSON
    #[arg(long, short)]
    output: Option<PathBuf>,
}

impl RunArgs {
    fn config(&self) -> SimulationConfig {
        let mid_increase = match (self.cortical_increase, self.striatal_increase) {
            (None, None) => None,
            (cortical, striatal) => Some(MidIncrease {
                onset: self.increase_onset,
                cortical: cortical.unwrap_or(0.0),
                striatal: striatal.unwrap_or(0.0),
            }),
        };
        let amplitude_increase = self.amplitude_increase.map(|amount| AmplitudeIncrease {
            onset: self.increase_onset,
            amount,
        });

        SimulationConfig {
            control_start: self.control_start,
            steady_state_pad: self.pad,
            mid_increase,
            amplitude_increase,
            ..SimulationConfig::new(self.time, self.dt).with_init_theta(self.init_theta)
        }
    }
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => run_single(args),
        Command::Scenario { which } => {
            let scenario = match which {
                ScenarioKind::Endogenous => Scenario::endogenous(),
                ScenarioKind::Cortical => Scenario::cortical(),
            };
            for summary in scenario.run_all()? {
                println!("{summary}");
            }
            Ok(())
        }
        Command::Topology {
            constants,
            png,
            output,
        } => {
            let constants = load_constants(constants.as_deref())?;
            match (png, output) {
                (true, Some(path)) => {
                    let image = render::to_png(&constants).context("running graphviz")?;
                    fs::write(&path, image)
                        .with_context(|| format!("writing {}", path.display()))?;
                }
                (_, Some(path)) => fs::write(&path, render::to_dot(&constants))
                    .with_context(|| format!("writing {}", path.display()))?,
                (_, None) => println!("{}", render::to_dot(&constants)),
            }
            Ok(())
        }
    }
}

fn run_single(args: RunArgs) -> anyhow::Result<()> {
    let constants = load_constants(args.constants.as_deref())?;
    let config = args.config();
    let mut controller = args.controller.build(&args.params, config.dt)?;

    let started = Instant::now();
    let out = run_simulation(&constants, config.clone(), controller.as_mut())?;
    info!("{} samples in {:.2?}", out.len(), started.elapsed());

    let summary = Summary::new(controller.name(), &out, &config);
    println!("{summary}");

    if let Some(path) = &args.output {
        write_trajectory(path, controller.name(), &out, config.steady_state_pad)?;
        info!("trajectory written to {}", path.display());
    }
    Ok(())
}

/// Healthy constants unless a JSON file is given.
fn load_constants(path: Option<&Path>) -> anyhow::Result<Constants> {
    let Some(path) = path else {
        return Ok(Constants::healthy());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;

    let constants = match value {
        serde_json::Value::Array(_) => {
            let values: Vec<f64> = serde_json::from_value(value)?;
            Constants::from_slice(&values)?
        }
        serde_json::Value::Object(_) => serde_json::from_value(value)?,
        _ => bail!("{}: expected an object or an array of numbers", path.display()),
    };
    constants.validate()?;
    Ok(constants)
}

fn write_trajectory(
    path: &Path,
    controller: &str,
    out: &Trajectory,
    from: f64,
) -> anyhow::Result<()> {
    let start = out.index_at(from);
    let view = out.after(from);
    let doc = json!({
        "controller": controller,
        "dt": out.dt(),
        "time": out.times().skip(start).collect::<Vec<_>>(),
        "stn": view.stn(),
        "gpe": view.gpe(),
        "theta": view.theta(),
        "stimulation": out.control_after(from),
        "oscillation": &out.input()[start..],
    });
    fs::write(path, serde_json::to_string(&doc)?)
        .with_context(|| format!("writing {}", path.display()))
}

/// One line per run: final state and oscillation measures after the padding.
#[derive(Clone, Debug)]
pub struct Summary {
    pub controller: &'static str,
    pub final_state: State,
    pub raw_amplitude: f64,
    pub beta_amplitude: Option<f64>,
    pub mean_abs_stimulation: f64,
}

impl Summary {
    pub fn new(controller: &'static str, out: &Trajectory, config: &SimulationConfig) -> Self {
        let view = out.after(config.steady_state_pad);
        let tail = SUMMARY_TAIL.min(config.simulation_time);

        let beta_amplitude = match analysis::band_amplitude(view.stn(), out.dt(), tail, Band::BETA)
        {
            Ok(a) => Some(a),
            Err(e) => {
                warn!("{controller}: no beta amplitude: {e}");
                None
            }
        };

        let stimulation = out.control_after(config.steady_state_pad);
        let mean_abs_stimulation = if stimulation.is_empty() {
            0.0
        } else {
            stimulation.iter().map(|s| s.abs()).sum::<f64>() / stimulation.len() as f64
        };

        Self {
            controller,
            final_state: view.last().unwrap_or(config.init_state),
            raw_amplitude: analysis::raw_amplitude(view.stn(), out.dt(), tail),
            beta_amplitude,
            mean_abs_stimulation,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<18} stn {:8.3}  gpe {:8.3}  theta {:8.4}  ptp {:8.3}",
            self.controller,
            self.final_state.stn,
            self.final_state.gpe,
            self.final_state.theta,
            self.raw_amplitude,
        )?;
        match self.beta_amplitude {
            Some(a) => write!(f, "  beta {a:8.3}")?,
            None => write!(f, "  beta      n/a")?,
        }
        write!(f, "  |u| {:8.3}", self.mean_abs_stimulation)
    }
}
