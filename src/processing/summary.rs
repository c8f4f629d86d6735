use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use super::solution::{Solution, Termination};
use crate::discretization::DiscretizedModel;
use crate::physics::model::Model;
use crate::physics::variables::Key;

/// Plain-text report of one simulation run.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationSummary {
    pub model_name: String,
    pub submodels: Vec<String>,
    pub citations: Vec<String>,

    pub mesh_points: Vec<(String, usize)>,
    pub total_mesh_points: usize,
    pub n_states: usize,
    pub n_differential: usize,
    pub n_algebraic: usize,
    pub n_events: usize,

    pub steps: Option<usize>,
    pub final_time: Option<f64>,
    pub termination: Option<Termination>,
    pub interpolation_times: Vec<(String, f64)>,
    pub final_values: Vec<(String, f64)>,
}

impl SimulationSummary {
    pub fn from_problem(model: &Model, discretized: &DiscretizedModel) -> Self {
        let mesh = discretized.mesh();
        let mesh_points = mesh
            .domains()
            .map(|d| {
                let points = mesh.level_size(std::slice::from_ref(d)).unwrap_or(0);
                (d.to_string(), points)
            })
            .collect();

        Self {
            model_name: model.name().to_string(),
            submodels: model.submodel_order().to_vec(),
            citations: model.citations().to_vec(),
            mesh_points,
            total_mesh_points: mesh.total_points(),
            n_states: discretized.len(),
            n_differential: discretized.n_differential(),
            n_algebraic: discretized.n_algebraic(),
            n_events: discretized.events().len(),
            steps: None,
            final_time: None,
            termination: None,
            interpolation_times: Vec::new(),
            final_values: Vec::new(),
        }
    }

    /// Record the outcome of a run plus the final value of every
    /// single-point quantity in `keys`.
    pub fn add_solution(&mut self, discretized: &DiscretizedModel, solution: &Solution, keys: &[Key]) {
        self.steps = Some(solution.len().saturating_sub(1));
        self.termination = Some(solution.termination.clone());
        self.interpolation_times = solution.interpolation_times.clone();
        if let Some((t, y)) = solution.last() {
            self.final_time = Some(t);
            self.final_values = keys
                .iter()
                .filter_map(|key| {
                    let value = discretized.output(*key, t, y).ok()?;
                    (value.len() == 1).then(|| (key.to_string(), value[0]))
                })
                .collect();
        }
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        write!(file, "{self}")
    }

    pub fn print_to_console(&self) {
        println!("\n{}", "=".repeat(60));
        println!("SIMULATION SUMMARY");
        println!("{}", "=".repeat(60));
        println!("Model:         {}", self.model_name);
        println!(
            "States:        {} ({} differential, {} algebraic)",
            self.n_states, self.n_differential, self.n_algebraic
        );
        if let (Some(steps), Some(t)) = (self.steps, self.final_time) {
            println!("Steps:         {steps}, final t = {t:.6e}");
        }
        if let Some(termination) = &self.termination {
            println!("Stopped by:    {termination}");
        }
        println!("{}\n", "=".repeat(60));
    }
}

impl fmt::Display for SimulationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        let thin = "-".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "{}", self.model_name.to_uppercase())?;
        writeln!(f, "{rule}")?;
        writeln!(f)?;

        writeln!(f, "SUBMODELS (coupling order)")?;
        writeln!(f, "{thin}")?;
        for name in &self.submodels {
            writeln!(f, "  {name}")?;
        }
        writeln!(f)?;

        writeln!(f, "MESH")?;
        writeln!(f, "{thin}")?;
        for (domain, points) in &self.mesh_points {
            writeln!(f, "  {domain:<28} {points:>6}")?;
        }
        writeln!(f, "  {:<28} {:>6}", "total", self.total_mesh_points)?;
        writeln!(f)?;

        writeln!(f, "DISCRETISED SYSTEM")?;
        writeln!(f, "{thin}")?;
        writeln!(f, "States:              {}", self.n_states)?;
        writeln!(f, "  differential:      {}", self.n_differential)?;
        writeln!(f, "  algebraic:         {}", self.n_algebraic)?;
        writeln!(f, "Events:              {}", self.n_events)?;
        writeln!(f)?;

        if let Some(termination) = &self.termination {
            writeln!(f, "RUN")?;
            writeln!(f, "{thin}")?;
            if let Some(steps) = self.steps {
                writeln!(f, "Steps:               {steps}")?;
            }
            if let Some(t) = self.final_time {
                writeln!(f, "Final time:          {t:.6e}")?;
            }
            writeln!(f, "Termination:         {termination}")?;
            for (name, t) in &self.interpolation_times {
                writeln!(f, "  {name} crossed at t = {t:.6e}")?;
            }
            for (name, value) in &self.final_values {
                writeln!(f, "  {name:<48} {value:>14.6e}")?;
            }
            writeln!(f)?;
        }

        if !self.citations.is_empty() {
            writeln!(f, "CITATIONS")?;
            writeln!(f, "{thin}")?;
            writeln!(f, "  {}", self.citations.join(", "))?;
            writeln!(f)?;
        }

        writeln!(f, "{rule}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::{lithium_ion_mesh, Discretization};
    use crate::models::single_particle_model;
    use crate::physics::context::ModelContext;
    use indexmap::IndexMap;

    #[test]
    fn mesh_section_lists_every_submesh_and_the_total() {
        let ctx = ModelContext::lithium_ion();
        let model = single_particle_model(&ctx).unwrap();
        let mesh = lithium_ion_mesh(ctx.params.as_ref(), &IndexMap::new(), 5).unwrap();
        let disc = Discretization::new(mesh).process_model(&model).unwrap();
        let summary = SimulationSummary::from_problem(&model, &disc);

        let listed: usize = summary.mesh_points.iter().map(|(_, n)| n).sum();
        assert_eq!(summary.total_mesh_points, listed);
        assert!(summary.mesh_points.iter().any(|(d, n)| d == "current collector" && *n == 1));
        assert!(summary.to_string().contains("total"));
    }
}
