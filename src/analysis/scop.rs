//! Static Control Parts (SCoPs): the analyzed input of a tiling pass.
//!
//! A SCoP bundles the statement domains, the flow dependences between
//! statement instances and the initial schedule. Parameters are bound to
//! concrete values here; every set is materialized under those values.

use crate::polyhedral::{AffineMap, BasicSet, Instance, UnionMap, UnionSet};
use crate::schedule::{Band, Schedule};
use crate::utils::errors::{ScopError, ScopErrorKind, SetError, TileResult};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A named parameter with its bound value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name as used in the sets
    pub name: String,
    /// Value the parameter is bound to
    pub value: i64,
}

/// A statement of the SCoP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// Statement name (the tuple name of its instances)
    pub name: String,
    /// Iteration domain
    pub domain: BasicSet,
    /// Initial schedule, one member per band dimension
    pub schedule: AffineMap,
}

/// A Static Control Part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scop {
    /// Name of the kernel
    pub name: String,
    /// Parameters in declaration order
    #[serde(default)]
    pub params: Vec<Parameter>,
    /// Statements
    pub statements: Vec<Statement>,
    /// Flow dependences, as relations from writer to reader
    #[serde(default)]
    pub flow: Vec<BasicSet>,
}

impl Scop {
    /// Create an empty SCoP.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            statements: Vec::new(),
            flow: Vec::new(),
        }
    }

    /// Declare a parameter bound to `value`.
    pub fn with_param(mut self, name: impl Into<String>, value: i64) -> Self {
        self.params.push(Parameter { name: name.into(), value });
        self
    }

    /// Add a statement.
    pub fn add_statement(&mut self, name: impl Into<String>, domain: BasicSet, schedule: AffineMap) {
        let name = name.into();
        let schedule = schedule.with_tuple(name.clone());
        self.statements.push(Statement { name, domain, schedule });
    }

    /// Add a flow dependence relation.
    pub fn add_flow(&mut self, relation: BasicSet) {
        self.flow.push(relation);
    }

    /// Parameter values in declaration order.
    pub fn param_values(&self) -> Vec<i64> {
        self.params.iter().map(|p| p.value).collect()
    }

    /// Parameter names in declaration order.
    pub fn param_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }

    /// Look up a statement by name.
    pub fn statement(&self, name: &str) -> Option<&Statement> {
        self.statements.iter().find(|s| s.name == name)
    }

    /// Statement names in name order.
    pub fn statement_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.statements.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Number of schedule members shared by every statement.
    pub fn schedule_dim(&self) -> usize {
        self.statements.first().map(|s| s.schedule.n_out()).unwrap_or(0)
    }

    /// Check names, dimensions and parameter usage.
    pub fn validate(&self) -> Result<(), ScopError> {
        if self.statements.is_empty() {
            return Err(ScopError::new(
                ScopErrorKind::MissingSchedule,
                format!("SCoP {} has no statements", self.name),
            ));
        }
        let mut seen = BTreeSet::new();
        for stmt in &self.statements {
            if !seen.insert(stmt.name.as_str()) {
                return Err(ScopError::new(
                    ScopErrorKind::DimensionMismatch,
                    format!("statement {} is declared twice", stmt.name),
                ));
            }
            let tuple = stmt.domain.tuple_name();
            if !tuple.is_empty() && tuple != stmt.name {
                return Err(ScopError::new(
                    ScopErrorKind::UnknownStatement,
                    format!("domain of {} is named {}", stmt.name, tuple),
                ));
            }
            self.check_params(&stmt.name, &stmt.domain.space.param_names, stmt.domain.n_param())?;
            if stmt.schedule.n_in() != stmt.domain.dim() {
                return Err(ScopError::new(
                    ScopErrorKind::DimensionMismatch,
                    format!(
                        "schedule of {} reads {} variables, domain has {}",
                        stmt.name,
                        stmt.schedule.n_in(),
                        stmt.domain.dim()
                    ),
                ));
            }
            if stmt.schedule.n_param() > self.params.len() {
                return Err(ScopError::new(
                    ScopErrorKind::UnboundParameter,
                    format!("schedule of {} uses unbound parameters", stmt.name),
                ));
            }
            if stmt.schedule.n_out() != self.schedule_dim() || stmt.schedule.n_out() == 0 {
                return Err(ScopError::new(
                    ScopErrorKind::DimensionMismatch,
                    format!("schedule of {} has {} members", stmt.name, stmt.schedule.n_out()),
                ));
            }
        }

        for dep in &self.flow {
            let src = self.endpoint(dep.space.in_tuple_name())?;
            let dst = self.endpoint(dep.tuple_name())?;
            if dep.space.n_in != src.domain.dim() || dep.dim() != dst.domain.dim() {
                return Err(ScopError::new(
                    ScopErrorKind::DimensionMismatch,
                    format!("dependence {} does not match its statements", dep.space),
                ));
            }
            self.check_params(&dep.space.to_string(), &dep.space.param_names, dep.n_param())?;
        }
        Ok(())
    }

    fn endpoint(&self, name: &str) -> Result<&Statement, ScopError> {
        self.statement(name).ok_or_else(|| {
            ScopError::new(
                ScopErrorKind::UnknownStatement,
                format!("dependence refers to unknown statement `{}`", name),
            )
        })
    }

    /// Parameters of a set must be a prefix of the SCoP parameters.
    fn check_params(&self, owner: &str, names: &[String], n_param: usize) -> Result<(), ScopError> {
        if n_param > self.params.len() {
            return Err(ScopError::new(
                ScopErrorKind::UnboundParameter,
                format!("{} uses {} parameters, {} are bound", owner, n_param, self.params.len()),
            ));
        }
        let prefix = names.iter().zip(&self.params).all(|(n, p)| *n == p.name);
        if !prefix || names.len() > self.params.len() {
            return Err(ScopError::new(
                ScopErrorKind::NonContiguousParams,
                format!(
                    "parameters [{}] of {} are not a prefix of [{}]",
                    names.join(", "),
                    owner,
                    self.param_names().join(", ")
                ),
            ));
        }
        Ok(())
    }

    /// All statement instances.
    pub fn domain(&self) -> Result<UnionSet, SetError> {
        let params = self.param_values();
        let mut domain = UnionSet::new();
        for stmt in &self.statements {
            let instances = stmt.domain.to_union_set(&params)?;
            domain.extend(instances.iter().map(|i| Instance::new(stmt.name.clone(), i.coords.clone())));
        }
        debug!("domain of {} has {} instances", self.name, domain.len());
        Ok(domain)
    }

    /// A dependence relation restricted to its statements' domains on both sides.
    pub fn restricted_flow(&self, dep: &BasicSet) -> Result<BasicSet, ScopError> {
        let src = self.endpoint(dep.space.in_tuple_name())?;
        let dst = self.endpoint(dep.tuple_name())?;
        let mut relation = dep.clone();
        let lifted = src
            .domain
            .lift_to_domain(&dst.domain.space)
            .constraints
            .constraints
            .into_iter()
            .chain(dst.domain.lift_to_range(&src.domain.space).constraints.constraints);
        for c in lifted {
            relation.add_constraint(c);
        }
        Ok(relation)
    }

    /// A dependence relation with the domain constraints of both sides dropped.
    ///
    /// Padding points outside the domain still have an image under the
    /// result, which is what sampling a padded tile needs.
    pub fn gisted_flow(&self, dep: &BasicSet) -> Result<BasicSet, ScopError> {
        let src = self.endpoint(dep.space.in_tuple_name())?;
        let dst = self.endpoint(dep.tuple_name())?;
        Ok(dep
            .gist(&src.domain.lift_to_domain(&dst.domain.space))
            .gist(&dst.domain.lift_to_range(&src.domain.space)))
    }

    /// All flow dependence pairs between domain instances.
    pub fn flow(&self) -> TileResult<UnionMap> {
        let params = self.param_values();
        let mut flow = UnionMap::new();
        for dep in &self.flow {
            let relation = self.restricted_flow(dep)?;
            flow.extend(relation.to_union_map(&params)?.iter().cloned());
        }
        debug!("flow of {} has {} pairs", self.name, flow.len());
        Ok(flow)
    }

    /// The initial schedule as a single band.
    pub fn band(&self) -> Band {
        let schedule = self
            .statements
            .iter()
            .map(|s| (s.name.clone(), s.schedule.clone()))
            .collect();
        let mut band = Band::new(schedule);
        band.permutable = true;
        band
    }

    /// The initial schedule tree: one band over the whole domain.
    pub fn schedule(&self) -> TileResult<Schedule> {
        self.validate()?;
        Ok(Schedule::from_band(self.domain()?, self.param_values(), self.band()))
    }

    /// Parse a SCoP from JSON.
    pub fn from_json(json: &str) -> TileResult<Self> {
        let scop: Scop = serde_json::from_str(json)?;
        scop.validate()?;
        Ok(scop)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> TileResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels;
    use crate::polyhedral::Space;

    #[test]
    fn test_heat_1d_materializes() {
        let scop = kernels::heat_1d(10, 20);
        scop.validate().unwrap();
        let domain = scop.domain().unwrap();
        assert_eq!(domain.len(), 200);
        let flow = scop.flow().unwrap();
        // interior points have three readers, the two edges two
        assert_eq!(flow.len(), 9 * (18 * 3 + 2 * 2));
        assert!(flow.contains(&Instance::new("S", vec![0, 0]), &Instance::new("S", vec![1, 1])));
        assert!(!flow.contains(&Instance::new("S", vec![0, 0]), &Instance::new("S", vec![1, -1])));
    }

    #[test]
    fn test_gisted_flow_keeps_padding() {
        let scop = kernels::heat_1d(10, 20);
        let gisted = scop.gisted_flow(&scop.flow[0]).unwrap();
        let image = gisted.image_of_point(&[0, -1], &scop.param_values()).unwrap();
        assert_eq!(image.len(), 1);
    }

    #[test]
    fn test_non_contiguous_params_rejected() {
        let mut scop = kernels::heat_1d(10, 20);
        let names = vec!["N".to_string(), "T".to_string()];
        scop.statements[0].domain = scop.statements[0].domain.clone().with_param_names(names);
        let err = scop.validate().unwrap_err();
        assert_eq!(err.kind, ScopErrorKind::NonContiguousParams);
    }

    #[test]
    fn test_unknown_dependence_endpoint() {
        let mut scop = kernels::heat_1d(4, 4);
        scop.add_flow(BasicSet::universe(Space::named_map("S", 2, "R", 2)));
        assert_eq!(scop.validate().unwrap_err().kind, ScopErrorKind::UnknownStatement);
    }

    #[test]
    fn test_json_round_trip() {
        let scop = kernels::jacobi_1d(4, 8);
        let json = scop.to_json().unwrap();
        let back = Scop::from_json(&json).unwrap();
        assert_eq!(back, scop);
        assert_eq!(back.statement_names(), vec!["S0", "S1"]);
    }
}
