//! Printing of polyhedral objects and schedule trees.
//!
//! Sets and maps use an isl-like notation; union sets are printed as their
//! coalesced boxes. Schedule trees are printed one node per line, indented
//! by depth.

use crate::analysis::Scop;
use crate::polyhedral::{AffineExpr, AffineMap, BasicSet, UnionMap, UnionSet};
use crate::schedule::{Schedule, ScheduleNode};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Pretty printer for polyhedral objects.
pub struct PolyPrinter {
    /// Indentation level
    indent: usize,
    /// Output buffer
    buffer: String,
    /// Dimension names per statement
    dim_names: BTreeMap<String, Vec<String>>,
    /// Parameter names
    param_names: Vec<String>,
}

impl PolyPrinter {
    /// Create a new printer.
    pub fn new() -> Self {
        Self {
            indent: 0,
            buffer: String::new(),
            dim_names: BTreeMap::new(),
            param_names: Vec::new(),
        }
    }

    /// A printer that names dimensions and parameters after `scop`.
    pub fn for_scop(scop: &Scop) -> Self {
        let mut printer = Self::new();
        printer.param_names = scop.param_names();
        for stmt in &scop.statements {
            printer.dim_names.insert(stmt.name.clone(), stmt.domain.space.all_dim_names());
        }
        printer
    }

    /// Get the output.
    pub fn output(&self) -> &str {
        &self.buffer
    }

    /// Take the output.
    pub fn take_output(self) -> String {
        self.buffer
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.buffer.push_str("  ");
        }
    }

    fn names_of(&self, tuple: &str, n: usize) -> Vec<String> {
        match self.dim_names.get(tuple) {
            Some(names) if names.len() == n => names.clone(),
            _ => (0..n).map(|i| format!("i{}", i)).collect(),
        }
    }

    /// Print an expression over the dimensions of `tuple`.
    pub fn print_expr(&mut self, expr: &AffineExpr, tuple: &str) {
        let names = self.names_of(tuple, expr.n_dim());
        self.buffer.push_str(&expr.to_string_with_names(&names, &self.param_names));
    }

    /// Print a basic set or relation.
    pub fn print_set(&mut self, set: &BasicSet) {
        let _ = write!(self.buffer, "{}", set);
    }

    /// Print a statement schedule: `S[t, i] -> [t, t + i]`.
    pub fn print_map(&mut self, map: &AffineMap) {
        let names = self.names_of(map.tuple_name(), map.n_in());
        self.buffer.push_str(&map.to_string_with_names(&names, &self.param_names));
    }

    /// Print a union set as its coalesced boxes.
    pub fn print_union_set(&mut self, set: &UnionSet) {
        let pieces: Vec<String> = set
            .coalesce()
            .iter()
            .map(|p| {
                let names = self.names_of(&p.tuple, p.lo.len());
                p.to_string_with_names(&names)
            })
            .collect();
        let _ = write!(self.buffer, "{{ {} }}", pieces.join("; "));
    }

    fn print_expansion(&mut self, expansion: &UnionMap) {
        let anchors = expansion.domain();
        let _ = write!(
            self.buffer,
            "{} anchors -> {} instances",
            anchors.len(),
            expansion.len()
        );
    }

    fn print_node(&mut self, node: &ScheduleNode) {
        self.write_indent();
        match node {
            ScheduleNode::Band(band) => {
                self.buffer.push_str("band: [");
                let maps: Vec<&AffineMap> = band.schedule.values().collect();
                for (k, map) in maps.iter().enumerate() {
                    if k > 0 {
                        self.buffer.push_str("; ");
                    }
                    self.print_map(map);
                }
                self.buffer.push(']');
                if band.coincident.iter().any(|&c| c) {
                    let flags: Vec<&str> = band.coincident.iter().map(|&c| if c { "1" } else { "0" }).collect();
                    let _ = write!(self.buffer, " coincident: [{}]", flags.join(", "));
                }
                if band.permutable {
                    self.buffer.push_str(" permutable");
                }
                self.buffer.push('\n');
                self.print_children(node);
            }
            ScheduleNode::Sequence(_) => {
                self.buffer.push_str("sequence\n");
                self.print_children(node);
            }
            ScheduleNode::Filter(filter) => {
                self.buffer.push_str("filter: ");
                self.print_union_set(&filter.filter);
                self.buffer.push('\n');
                self.print_children(node);
            }
            ScheduleNode::Expansion { expansion, .. } => {
                self.buffer.push_str("expansion: ");
                self.print_expansion(expansion);
                self.buffer.push('\n');
                self.print_children(node);
            }
            ScheduleNode::Leaf => self.buffer.push_str("leaf\n"),
        }
    }

    fn print_children(&mut self, node: &ScheduleNode) {
        self.indent += 1;
        for i in 0..node.n_children() {
            if let Some(child) = node.child(i) {
                self.print_node(child);
            }
        }
        self.indent -= 1;
    }

    /// Print a schedule tree, one node per line.
    pub fn print_schedule(&mut self, schedule: &Schedule) {
        let _ = writeln!(self.buffer, "domain: {} instances", schedule.domain.len());
        self.print_node(&schedule.root);
    }

    /// Print a SCoP: parameters, statements and dependences.
    pub fn print_scop(&mut self, scop: &Scop) {
        let _ = writeln!(self.buffer, "SCoP: {}", scop.name);
        let params: Vec<String> = scop.params.iter().map(|p| format!("{} = {}", p.name, p.value)).collect();
        let _ = writeln!(self.buffer, "Parameters: [{}]", params.join(", "));
        let _ = writeln!(self.buffer, "Statements ({}):", scop.statements.len());
        self.indent += 1;
        for stmt in &scop.statements {
            self.write_indent();
            let _ = writeln!(self.buffer, "{}:", stmt.name);
            self.indent += 1;
            self.write_indent();
            self.buffer.push_str("Domain: ");
            self.print_set(&stmt.domain);
            self.buffer.push('\n');
            self.write_indent();
            self.buffer.push_str("Schedule: ");
            self.print_map(&stmt.schedule);
            self.buffer.push('\n');
            self.indent -= 1;
        }
        self.indent -= 1;
        let _ = writeln!(self.buffer, "Flow dependences ({}):", scop.flow.len());
        self.indent += 1;
        for dep in &scop.flow {
            self.write_indent();
            self.print_set(dep);
            self.buffer.push('\n');
        }
        self.indent -= 1;
    }
}

impl Default for PolyPrinter {
    fn default() -> Self {
        Self::new()
    }
}

/// Print a domain to a string.
pub fn print_domain(set: &BasicSet) -> String {
    let mut printer = PolyPrinter::new();
    printer.print_set(set);
    printer.take_output()
}

/// Print a schedule tree to a string, naming dimensions after `scop`.
pub fn print_schedule(schedule: &Schedule, scop: &Scop) -> String {
    let mut printer = PolyPrinter::for_scop(scop);
    printer.print_schedule(schedule);
    printer.take_output()
}

/// Print a SCoP to a string.
pub fn print_scop(scop: &Scop) -> String {
    let mut printer = PolyPrinter::for_scop(scop);
    printer.print_scop(scop);
    printer.take_output()
}

/// ASCII map of the phase of every 2-D instance of `tuple`.
///
/// Time runs downwards, the space dimension to the right. Each instance
/// shows its phase index, `.` marks points outside every phase.
pub fn visualize_phases(phases: &[UnionSet], tuple: &str) -> String {
    let mut owner: BTreeMap<(i64, i64), usize> = BTreeMap::new();
    for (k, phase) in phases.iter().enumerate() {
        for inst in phase.iter().filter(|i| i.tuple == tuple && i.dim() == 2) {
            owner.insert((inst.coords[0], inst.coords[1]), k);
        }
    }
    let (Some(t_min), Some(t_max)) = (owner.keys().map(|p| p.0).min(), owner.keys().map(|p| p.0).max()) else {
        return format!("no 2-D instances of {}\n", tuple);
    };
    let x_min = owner.keys().map(|p| p.1).min().unwrap_or(0);
    let x_max = owner.keys().map(|p| p.1).max().unwrap_or(0);

    let mut output = String::new();
    output.push_str("    ");
    for x in x_min..=x_max {
        let _ = write!(output, "{:3}", x);
    }
    output.push('\n');
    for t in t_min..=t_max {
        let _ = write!(output, "{:3} ", t);
        for x in x_min..=x_max {
            match owner.get(&(t, x)) {
                Some(k) => {
                    let _ = write!(output, "{:>3}", k);
                }
                None => output.push_str("  ."),
            }
        }
        output.push('\n');
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels;
    use crate::polyhedral::Instance;
    use crate::schedule::{NodePath, TileOptions};

    #[test]
    fn test_print_scop() {
        let scop = kernels::heat_1d(4, 6);
        let output = print_scop(&scop);
        assert!(output.contains("SCoP: heat-1d"));
        assert!(output.contains("T = 4"));
        assert!(output.contains("S[t, i] -> ["));
        assert!(output.contains("Flow dependences (3)"));
    }

    #[test]
    fn test_print_tiled_schedule() {
        let scop = kernels::heat_1d(4, 6);
        let mut schedule = scop.schedule().unwrap();
        schedule.tile(&NodePath::root(), &[2, 2], TileOptions::default()).unwrap();
        let output = print_schedule(&schedule, &scop);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "domain: 24 instances");
        assert!(lines[1].starts_with("band: [S[t, i] -> ["));
        assert!(lines[2].starts_with("  band: "));
        assert_eq!(lines[3], "    leaf");
    }

    #[test]
    fn test_union_set_boxes() {
        let set: UnionSet = (0..3).map(|i| Instance::new("S", vec![0, i])).collect();
        let mut printer = PolyPrinter::for_scop(&kernels::heat_1d(1, 3));
        printer.print_union_set(&set);
        assert_eq!(printer.output(), "{ S[t, i] : t = 0 and 0 <= i <= 2 }");
    }

    #[test]
    fn test_print_expr_uses_statement_names() {
        let scop = kernels::heat_1d(4, 6);
        let stmt = scop.statement("S").unwrap();
        let mut printer = PolyPrinter::for_scop(&scop);
        let s1 = stmt.schedule.member(1).unwrap();
        printer.print_expr(&s1.modulo(4), "S");
        assert!(printer.output().contains("floor((t + i)/4)"), "{}", printer.output());
    }

    #[test]
    fn test_visualize_phases() {
        let zero: UnionSet = [Instance::new("S", vec![0, 0]), Instance::new("S", vec![0, 1])].into_iter().collect();
        let one: UnionSet = [Instance::new("S", vec![1, 1])].into_iter().collect();
        let output = visualize_phases(&[zero, one], "S");
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "  0   0  0");
        assert_eq!(lines[2], "  1   .  1");
        assert!(visualize_phases(&[], "S").starts_with("no 2-D"));
    }
}
