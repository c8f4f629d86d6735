use std::env;
use std::error::Error;
use std::fs;
use std::process::ExitCode;

use battery_fv::config::SimulationConfig;
use battery_fv::discretization::{lithium_ion_mesh, Discretization};
use battery_fv::models::lithium_ion::working_electrodes;
use battery_fv::models::single_particle_model;
use battery_fv::physics::variables::Key;
use battery_fv::processing::csv_writer;
use battery_fv::processing::summary::SimulationSummary;
use tracing::{error, info, trace};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = match env::args().nth(1) {
        Some(path) => {
            info!(%path, "loading configuration");
            SimulationConfig::from_file(path)?
        }
        None => SimulationConfig::default(),
    };
    let out_dir = config.output.directory.clone();
    fs::create_dir_all(&out_dir)?;

    let ctx = config.context();
    let model = single_particle_model(&ctx)?;
    let mesh = lithium_ion_mesh(ctx.params.as_ref(), &config.submesh_specs(), config.mesh.points)?;
    let discretized = Discretization::new(mesh).process_model(&model)?;
    let mut summary = SimulationSummary::from_problem(&model, &discretized);

    let solver = config.transient_solver();
    let solution = solver.solve(&discretized, |t, _| trace!(t, "accepted step"))?;

    let mut keys = vec![
        Key::Current,
        Key::DischargeCapacity,
        Key::TerminalVoltage,
        Key::XAveragedTemperature,
    ];
    for e in working_electrodes(config.model.working_electrode) {
        keys.push(Key::SurfaceConcentration(e));
        keys.push(Key::AverageParticleConcentration(e));
    }
    keys.retain(|k| discretized.output_keys().any(|o| o == k));

    let csv_path = out_dir.join("solution.csv");
    csv_writer::write_solution(&csv_path, &discretized, &solution, &keys)?;
    info!(path = %csv_path.display(), "solution written");

    summary.add_solution(&discretized, &solution, &keys);
    let summary_path = out_dir.join("simulation_summary.txt");
    summary.write_to_file(&summary_path)?;
    summary.print_to_console();
    info!(path = %summary_path.display(), "summary written");
    Ok(())
}
