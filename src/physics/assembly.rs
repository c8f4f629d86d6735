//! Merging submodel contributions into one frozen [`Model`].

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, info};

use super::bc::{describe_missing, BCRegistry};
use super::context::ModelContext;
use super::model::Model;
use super::variables::{Key, Variables};
use super::{Equations, Submodel};
use crate::error::ModelError;
use crate::expression::{Expr, Node, NodeId, VariableId};

/// Run every stage of every submodel and check the result for consistency.
pub fn assemble(
    name: &str,
    ctx: &ModelContext,
    mut submodels: Vec<Box<dyn Submodel>>,
) -> Result<Model, ModelError> {
    let mut variables = Variables::new();
    for submodel in submodels.iter_mut() {
        let fundamental = submodel.get_fundamental_variables()?;
        debug!(submodel = submodel.name(), count = fundamental.len(), "fundamental variables");
        let owner = submodel.name().to_string();
        variables.extend(fundamental, &owner)?;
    }

    let order = coupling_order(&submodels, &variables)?;
    let submodel_order: Vec<String> = order
        .iter()
        .map(|i| submodels[*i].name().to_string())
        .collect();
    debug!(order = ?submodel_order, "coupled stage order");

    for &i in &order {
        let coupled = submodels[i].get_coupled_variables(&variables)?;
        let owner = submodels[i].name().to_string();
        variables.extend(coupled, &owner)?;
    }

    let mut rhs = Equations::new();
    let mut algebraic = Equations::new();
    for submodel in &submodels {
        for (var, eq) in submodel.set_rhs(&variables)? {
            if rhs.contains_key(&var) {
                return Err(ModelError::DuplicateEquation(var.name()));
            }
            rhs.insert(var, eq);
        }
        for (var, eq) in submodel.set_algebraic(&variables)? {
            if rhs.contains_key(&var) || algebraic.contains_key(&var) {
                return Err(ModelError::DuplicateEquation(var.name()));
            }
            algebraic.insert(var, eq);
        }
    }

    let mut boundary_conditions = BCRegistry::new();
    let mut initial_conditions = Equations::new();
    let mut events = Vec::new();
    for submodel in &submodels {
        boundary_conditions.merge(submodel.set_boundary_conditions(&variables)?)?;
        for (var, ic) in submodel.set_initial_conditions(&variables)? {
            if initial_conditions.contains_key(&var) {
                return Err(ModelError::Configuration(format!(
                    "initial condition for `{}` registered twice",
                    var.name()
                )));
            }
            initial_conditions.insert(var, ic);
        }
        events.extend(submodel.set_events(&variables)?);
    }

    let model = Model {
        name: name.to_string(),
        pool: ctx.pool.clone(),
        variables,
        rhs,
        algebraic,
        boundary_conditions,
        initial_conditions,
        events,
        submodel_order,
        citations: ctx.citations(),
    };
    check_model(&model)?;
    info!(
        model = name,
        rhs = model.rhs.len(),
        algebraic = model.algebraic.len(),
        events = model.events.len(),
        "assembled model"
    );
    Ok(model)
}

/// Order the coupled stages so that every provider runs before its consumers.
fn coupling_order(
    submodels: &[Box<dyn Submodel>],
    fundamental: &Variables,
) -> Result<Vec<usize>, ModelError> {
    let mut providers: HashMap<Key, usize> = HashMap::new();
    for (i, submodel) in submodels.iter().enumerate() {
        for key in submodel.provides() {
            if let Some(other) = providers.insert(key, i) {
                if other != i {
                    return Err(ModelError::Configuration(format!(
                        "`{key}` is provided by both `{}` and `{}`",
                        submodels[other].name(),
                        submodel.name()
                    )));
                }
            }
        }
    }

    let n = submodels.len();
    // depends_on[i] lists the providers submodel i waits for.
    let mut depends_on: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, submodel) in submodels.iter().enumerate() {
        for key in submodel.requires() {
            match providers.get(&key) {
                Some(&p) if p != i => {
                    if !depends_on[i].contains(&p) {
                        depends_on[i].push(p);
                    }
                }
                Some(_) => {}
                None if fundamental.contains(key) => {}
                None => {
                    return Err(ModelError::DependencyLookup {
                        key: key.to_string(),
                        requested_by: submodel.name().to_string(),
                    })
                }
            }
        }
    }

    let mut indegree: Vec<usize> = depends_on.iter().map(Vec::len).collect();
    let mut queue: VecDeque<usize> = (0..n).filter(|i| indegree[*i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(p) = queue.pop_front() {
        order.push(p);
        for i in 0..n {
            if depends_on[i].contains(&p) {
                indegree[i] -= 1;
                if indegree[i] == 0 {
                    queue.push_back(i);
                }
            }
        }
    }

    if order.len() < n {
        let remaining: HashSet<usize> = (0..n).filter(|i| indegree[*i] > 0).collect();
        return Err(ModelError::CyclicDependency(find_cycle(
            submodels,
            &depends_on,
            &remaining,
        )));
    }
    Ok(order)
}

fn find_cycle(
    submodels: &[Box<dyn Submodel>],
    depends_on: &[Vec<usize>],
    remaining: &HashSet<usize>,
) -> Vec<String> {
    let Some(start) = remaining.iter().min().copied() else {
        return Vec::new();
    };
    let mut path = vec![start];
    let mut current = start;
    loop {
        let Some(next) = depends_on[current]
            .iter()
            .copied()
            .find(|p| remaining.contains(p))
        else {
            break;
        };
        if let Some(pos) = path.iter().position(|p| *p == next) {
            path.push(next);
            path.drain(..pos);
            break;
        }
        path.push(next);
        current = next;
    }
    path.into_iter()
        .map(|i| submodels[i].name().to_string())
        .collect()
}

fn check_model(model: &Model) -> Result<(), ModelError> {
    let determined: HashSet<VariableId> = model.states().map(|v| v.id()).collect();
    let name_of = |id: VariableId| model.pool.variable_info(id).name;

    let mut referenced: Vec<&Expr> = model.rhs.values().chain(model.algebraic.values()).collect();
    referenced.extend(model.events.iter().map(|e| &e.expression));
    for (_, bcs) in model.boundary_conditions.iter() {
        referenced.extend(bcs.left.iter().chain(bcs.right.iter()).map(|bc| &bc.value));
    }
    for expr in referenced {
        if let Some(missing) = expr.variables().into_iter().find(|v| !determined.contains(v)) {
            return Err(ModelError::UndeterminedVariable(name_of(missing)));
        }
    }

    for (var, eq) in model.rhs.iter().chain(model.algebraic.iter()) {
        let eq_domains = eq.domains();
        if !eq_domains.is_empty() && eq_domains != var.domains() {
            return Err(ModelError::domain(format!(
                "equation for `{}` lives on {eq_domains}, but the variable lives on {}",
                var.name(),
                var.domains()
            )));
        }
        let ic = model
            .initial_conditions
            .get(var)
            .ok_or_else(|| ModelError::MissingInitialCondition(var.name()))?;
        let ic_domains = ic.domains();
        if !ic_domains.is_empty() && ic_domains != var.domains() {
            return Err(ModelError::domain(format!(
                "initial condition for `{}` lives on {ic_domains}, but the variable lives on {}",
                var.name(),
                var.domains()
            )));
        }
        if let Some(dep) = ic.variables().into_iter().next() {
            return Err(ModelError::Configuration(format!(
                "initial condition for `{}` depends on the state variable `{}`",
                var.name(),
                name_of(dep)
            )));
        }
        check_boundary_conditions(eq, &model.boundary_conditions)?;
    }
    Ok(())
}

/// Every gradient of a state-dependent expression must either have both
/// boundary conditions itself or sit inside a divergence whose argument has.
fn check_boundary_conditions(eq: &Expr, bcs: &BCRegistry) -> Result<(), ModelError> {
    let pool = eq.pool();
    let mut seen: HashSet<(NodeId, bool)> = HashSet::new();
    let mut stack = vec![(eq.id(), false)];
    while let Some((id, covered)) = stack.pop() {
        if !seen.insert((id, covered)) {
            continue;
        }
        let node = pool.node(id);
        match &node {
            Node::Gradient(child) => {
                let child_expr = pool.expr(*child);
                let own = bcs.find_for(&child_expr);
                let complete = own.is_some_and(|b| b.is_complete());
                if !complete && !covered && !child_expr.variables().is_empty() {
                    return Err(ModelError::MissingBoundaryCondition {
                        variable: child_expr.label(),
                        side: describe_missing(own),
                    });
                }
                stack.push((*child, false));
            }
            Node::Divergence(child) => {
                let child_expr = pool.expr(*child);
                let flux_bcs = bcs
                    .find_for(&child_expr)
                    .is_some_and(|b| b.is_complete());
                stack.push((*child, flux_bcs));
            }
            other => {
                for child in other.children() {
                    stack.push((child, covered));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::domain::*;
    use crate::expression::{div, grad, Domains, Variable};
    use crate::physics::bc::{BoundaryCondition, BoundaryConditions};
    use crate::physics::variables::Electrode;

    /// Diffusion of one field, optionally leaving out its boundary conditions.
    struct Diffusion {
        ctx: ModelContext,
        with_bcs: bool,
        c: Option<Variable>,
    }

    impl Submodel for Diffusion {
        fn name(&self) -> &str {
            "diffusion"
        }

        fn get_fundamental_variables(&mut self) -> Result<Variables, ModelError> {
            let c = self
                .ctx
                .pool
                .variable("c", Domains::primary(&[NEGATIVE_PARTICLE]))?;
            self.c = Some(c.clone());
            Ok(Variables::new().with(Key::ParticleConcentration(Electrode::Negative), c))
        }

        fn set_rhs(&self, _: &Variables) -> Result<Equations, ModelError> {
            let c = self.c.clone().unwrap();
            let eq = div(&grad(c.expr())?)?;
            Ok(Equations::from([(c, eq)]))
        }

        fn set_boundary_conditions(&self, _: &Variables) -> Result<BCRegistry, ModelError> {
            let mut reg = BCRegistry::new();
            if self.with_bcs {
                let zero = self.ctx.pool.scalar(0.0);
                reg.add(
                    self.c.as_ref().unwrap().expr(),
                    BoundaryConditions::new(
                        BoundaryCondition::neumann(zero.clone()),
                        BoundaryCondition::neumann(zero),
                    ),
                )?;
            }
            Ok(reg)
        }

        fn set_initial_conditions(&self, _: &Variables) -> Result<Equations, ModelError> {
            let c = self.c.clone().unwrap();
            Ok(Equations::from([(c, self.ctx.pool.scalar(1.0))]))
        }
    }

    /// A submodel that only reads `requires` and writes `provides`.
    struct Coupler {
        name: String,
        requires: Vec<Key>,
        provides: Vec<Key>,
        pool: crate::expression::ExprPool,
    }

    impl Submodel for Coupler {
        fn name(&self) -> &str {
            &self.name
        }

        fn requires(&self) -> Vec<Key> {
            self.requires.clone()
        }

        fn provides(&self) -> Vec<Key> {
            self.provides.clone()
        }

        fn get_coupled_variables(&mut self, variables: &Variables) -> Result<Variables, ModelError> {
            for key in &self.requires {
                variables.get(*key, &self.name)?;
            }
            let mut out = Variables::new();
            for key in &self.provides {
                out.insert(*key, self.pool.scalar(1.0));
            }
            Ok(out)
        }
    }

    fn coupler(ctx: &ModelContext, name: &str, requires: &[Key], provides: &[Key]) -> Box<dyn Submodel> {
        Box::new(Coupler {
            name: name.into(),
            requires: requires.to_vec(),
            provides: provides.to_vec(),
            pool: ctx.pool.clone(),
        })
    }

    #[test]
    fn missing_boundary_condition_is_reported() {
        let ctx = ModelContext::lithium_ion();
        let sub = Diffusion {
            ctx: ctx.clone(),
            with_bcs: false,
            c: None,
        };
        let err = assemble("test", &ctx, vec![Box::new(sub)]).err().unwrap();
        assert_eq!(
            err,
            ModelError::MissingBoundaryCondition {
                variable: "c".into(),
                side: "left and right".into()
            }
        );
    }

    #[test]
    fn complete_model_assembles() {
        let ctx = ModelContext::lithium_ion();
        let sub = Diffusion {
            ctx: ctx.clone(),
            with_bcs: true,
            c: None,
        };
        let model = assemble("test", &ctx, vec![Box::new(sub)]).unwrap();
        assert_eq!(model.rhs().len(), 1);
        assert!(!model.is_dae());
    }

    #[test]
    fn providers_run_before_consumers() {
        let ctx = ModelContext::lithium_ion();
        let subs = vec![
            coupler(&ctx, "voltage", &[Key::Current], &[Key::TerminalVoltage]),
            coupler(&ctx, "circuit", &[], &[Key::Current]),
        ];
        let model = assemble("order", &ctx, subs).unwrap();
        assert_eq!(model.submodel_order(), ["circuit", "voltage"]);
    }

    #[test]
    fn cycles_are_fatal() {
        let ctx = ModelContext::lithium_ion();
        let subs = vec![
            coupler(&ctx, "a", &[Key::TotalHeating], &[Key::Current]),
            coupler(&ctx, "b", &[Key::Current], &[Key::TotalHeating]),
        ];
        match assemble("cycle", &ctx, subs) {
            Err(ModelError::CyclicDependency(chain)) => {
                assert_eq!(chain, vec!["a", "b", "a"]);
            }
            other => panic!("expected a cycle, got {:?}", other.err()),
        }
    }

    #[test]
    fn unprovided_dependencies_are_lookup_errors() {
        let ctx = ModelContext::lithium_ion();
        let subs = vec![coupler(&ctx, "voltage", &[Key::Current], &[])];
        assert!(matches!(
            assemble("lookup", &ctx, subs),
            Err(ModelError::DependencyLookup { .. })
        ));
    }
}
