//! The derived-variable evaluation graph ("brain").
//!
//! Built once after hydration from the document's calculation-bearing
//! variables. Whenever an input signal changes, dependent nodes
//! re-evaluate in topological order and the results go back out on the
//! bus as one batch. A cycle among derived variables is a build-time
//! error reported through the document error handler, never a runtime
//! hang.

use crate::expr::{self, Expr, ExprError, Scope};
use crate::signals::{Batch, SignalValue};
use serde_json::{Map, Number, Value};
use smol_str::SmolStr;
use std::collections::{BTreeMap, BTreeSet};
use vellum_api::{DataFormat, Transformation, Variable};

#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic)]
pub enum BrainError {
    #[error("cycle among derived variables involving `{0}`")]
    #[diagnostic(code(vellum::brain::cycle))]
    Cycle(SmolStr),
    #[error("derived variable `{variable}`: {source}")]
    #[diagnostic(code(vellum::brain::expr))]
    Expr {
        variable: SmolStr,
        source: ExprError,
    },
    #[error("data decode failed: {0}")]
    #[diagnostic(code(vellum::brain::data))]
    Data(String),
}

#[derive(Debug)]
enum NodeKind {
    Scalar(Expr),
    Frame {
        sources: Vec<SmolStr>,
        transformations: Vec<Transformation>,
    },
}

#[derive(Debug)]
struct Node {
    id: SmolStr,
    kind: NodeKind,
    inputs: BTreeSet<SmolStr>,
    is_array: bool,
}

#[derive(Debug, Default)]
pub struct Brain {
    nodes: Vec<Node>,
    /// Indices into `nodes`, dependency order.
    order: Vec<usize>,
}

impl Brain {
    /// Build the graph from variable metadata. Variables without a
    /// calculation are plain signals and contribute no node.
    pub fn build(variables: &[Variable]) -> Result<Self, BrainError> {
        let mut nodes = Vec::new();
        for var in variables {
            let Some(calculation) = &var.calculation else {
                continue;
            };
            let (kind, inputs) = match calculation {
                vellum_api::Calculation::Scalar { expression } => {
                    let parsed =
                        expr::parse(expression).map_err(|source| BrainError::Expr {
                            variable: var.variable_id.clone(),
                            source,
                        })?;
                    let mut inputs = BTreeSet::new();
                    parsed.references(&mut inputs);
                    (NodeKind::Scalar(parsed), inputs)
                }
                vellum_api::Calculation::DataFrame {
                    source_names,
                    transformations,
                } => {
                    let mut inputs: BTreeSet<SmolStr> = source_names.iter().cloned().collect();
                    for transformation in transformations {
                        let text = match transformation {
                            Transformation::Filter { expr } => Some(expr),
                            Transformation::Derive { expr, .. } => Some(expr),
                            Transformation::Other(_) => None,
                        };
                        if let Some(text) = text {
                            let parsed =
                                expr::parse(text).map_err(|source| BrainError::Expr {
                                    variable: var.variable_id.clone(),
                                    source,
                                })?;
                            parsed.references(&mut inputs);
                        }
                    }
                    (
                        NodeKind::Frame {
                            sources: source_names.clone(),
                            transformations: transformations.clone(),
                        },
                        inputs,
                    )
                }
            };
            nodes.push(Node {
                id: var.variable_id.clone(),
                kind,
                inputs,
                is_array: var.is_array,
            });
        }

        let order = topo_order(&nodes)?;
        Ok(Self { nodes, order })
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of every input that is not itself a derived node (external
    /// signals and data sources the brain listens for).
    pub fn external_inputs(&self) -> BTreeSet<SmolStr> {
        let derived: BTreeSet<&SmolStr> = self.nodes.iter().map(|n| &n.id).collect();
        self.nodes
            .iter()
            .flat_map(|n| n.inputs.iter())
            .filter(|input| !derived.contains(input))
            .cloned()
            .collect()
    }

    /// Re-evaluate nodes affected by `changed`, in dependency order.
    /// Node failures are collected per node; healthy nodes still
    /// produce output.
    pub fn evaluate(
        &self,
        changed: &BTreeSet<SmolStr>,
        state: &BTreeMap<SmolStr, SignalValue>,
    ) -> (Batch, Vec<BrainError>) {
        let mut out = Batch::new();
        let mut errors = Vec::new();
        let mut dirty: BTreeSet<SmolStr> = changed.clone();

        let mut scope = BrainScope {
            state,
            computed: BTreeMap::new(),
            datum: None,
        };

        for &index in &self.order {
            let node = &self.nodes[index];
            // Constant nodes (no inputs) re-evaluate every pass; the
            // result is identical so last-write-wins makes it harmless.
            if !node.inputs.is_empty() && node.inputs.is_disjoint(&dirty) {
                continue;
            }
            match self.evaluate_node(node, &mut scope) {
                Ok(value) => {
                    let is_data = matches!(node.kind, NodeKind::Frame { .. }) || node.is_array;
                    scope.computed.insert(node.id.clone(), value.clone());
                    dirty.insert(node.id.clone());
                    out.insert(
                        node.id.clone(),
                        SignalValue {
                            value,
                            is_data,
                        },
                    );
                }
                Err(err) => errors.push(err),
            }
        }
        (out, errors)
    }

    fn evaluate_node(&self, node: &Node, scope: &mut BrainScope<'_>) -> Result<Value, BrainError> {
        match &node.kind {
            NodeKind::Scalar(expr) => expr.eval(scope).map_err(|source| BrainError::Expr {
                variable: node.id.clone(),
                source,
            }),
            NodeKind::Frame {
                sources,
                transformations,
            } => {
                let mut rows: Vec<Value> = Vec::new();
                for source in sources {
                    let frame = scope
                        .lookup(source)
                        .ok_or_else(|| BrainError::Data(format!("unknown source `{source}`")))?;
                    match frame {
                        Value::Array(items) => rows.extend(items),
                        other => rows.push(other),
                    }
                }
                for transformation in transformations {
                    rows = apply_transformation(&node.id, transformation, rows, scope)?;
                }
                Ok(Value::Array(rows))
            }
        }
    }
}

struct BrainScope<'a> {
    state: &'a BTreeMap<SmolStr, SignalValue>,
    computed: BTreeMap<SmolStr, Value>,
    datum: Option<Value>,
}

impl Scope for BrainScope<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        if name == "datum" {
            if let Some(datum) = &self.datum {
                return Some(datum.clone());
            }
        }
        if let Some(value) = self.computed.get(name) {
            return Some(value.clone());
        }
        self.state.get(name).map(|sv| sv.value.clone())
    }
}

fn apply_transformation(
    node_id: &SmolStr,
    transformation: &Transformation,
    rows: Vec<Value>,
    scope: &mut BrainScope<'_>,
) -> Result<Vec<Value>, BrainError> {
    let wrap = |source: ExprError| BrainError::Expr {
        variable: node_id.clone(),
        source,
    };
    match transformation {
        Transformation::Filter { expr } => {
            let parsed = expr::parse(expr).map_err(wrap)?;
            let mut kept = Vec::with_capacity(rows.len());
            for row in rows {
                scope.datum = Some(row.clone());
                let keep = parsed.eval(scope).map_err(wrap)?;
                if value_truthy(&keep) {
                    kept.push(row);
                }
            }
            scope.datum = None;
            Ok(kept)
        }
        Transformation::Derive { field, expr } => {
            let parsed = expr::parse(expr).map_err(wrap)?;
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                scope.datum = Some(row.clone());
                let value = parsed.eval(scope).map_err(wrap)?;
                scope.datum = None;
                let mut object = match row {
                    Value::Object(map) => map,
                    other => {
                        let mut map = Map::new();
                        map.insert("value".to_string(), other);
                        map
                    }
                };
                object.insert(field.to_string(), value);
                out.push(Value::Object(object));
            }
            Ok(out)
        }
        // Unknown transformation kinds are carried but not executed.
        Transformation::Other(_) => Ok(rows),
    }
}

fn value_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn topo_order(nodes: &[Node]) -> Result<Vec<usize>, BrainError> {
    let index_of: BTreeMap<&SmolStr, usize> =
        nodes.iter().enumerate().map(|(i, n)| (&n.id, i)).collect();
    let mut in_degree = vec![0usize; nodes.len()];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for input in &node.inputs {
            if let Some(&from) = index_of.get(input) {
                successors[from].push(i);
                in_degree[i] += 1;
            }
        }
    }
    let mut ready: Vec<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(&index) = ready.first() {
        ready.remove(0);
        order.push(index);
        for &next in &successors[index] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(next);
                ready.sort_unstable();
            }
        }
    }
    if order.len() != nodes.len() {
        let stuck = (0..nodes.len())
            .find(|&i| in_degree[i] > 0)
            .map(|i| nodes[i].id.clone())
            .unwrap_or_default();
        return Err(BrainError::Cycle(stuck));
    }
    Ok(order)
}

/// Apply a loader's row transformations outside the graph (used when
/// data arrives from an inline block or a guarded fetch).
pub fn transform_rows(
    name: &SmolStr,
    transformations: &[Transformation],
    rows: Vec<Value>,
    state: &BTreeMap<SmolStr, SignalValue>,
) -> Result<Vec<Value>, BrainError> {
    let mut scope = BrainScope {
        state,
        computed: BTreeMap::new(),
        datum: None,
    };
    let mut rows = rows;
    for transformation in transformations {
        rows = apply_transformation(name, transformation, rows, &mut scope)?;
    }
    Ok(rows)
}

/// Decode tabular text into rows per the declared format.
pub fn decode_rows(
    format: DataFormat,
    delimiter: Option<char>,
    text: &str,
) -> Result<Value, BrainError> {
    match format {
        DataFormat::Json => {
            serde_json::from_str(text).map_err(|e| BrainError::Data(e.to_string()))
        }
        DataFormat::Csv => decode_dsv(',', text),
        DataFormat::Tsv => decode_dsv('\t', text),
        DataFormat::Dsv => decode_dsv(delimiter.unwrap_or('|'), text),
    }
}

fn decode_dsv(delimiter: char, text: &str) -> Result<Value, BrainError> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let Some(header) = lines.next() else {
        return Ok(Value::Array(Vec::new()));
    };
    let columns: Vec<&str> = header.split(delimiter).map(str::trim).collect();
    let mut rows = Vec::new();
    for line in lines {
        let mut object = Map::new();
        for (column, cell) in columns.iter().zip(line.split(delimiter)) {
            object.insert(column.to_string(), decode_cell(cell.trim()));
        }
        rows.push(Value::Object(object));
    }
    Ok(Value::Array(rows))
}

fn decode_cell(cell: &str) -> Value {
    if cell.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if cell.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(n) = cell.parse::<f64>() {
        if let Some(number) = Number::from_f64(n) {
            return Value::Number(number);
        }
    }
    Value::String(cell.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn var(id: &str, calculation: Value) -> Variable {
        serde_json::from_value(json!({
            "variableId": id,
            "type": "number",
            "initialValue": 0,
            "calculation": calculation
        }))
        .unwrap()
    }

    fn state(pairs: &[(&str, Value, bool)]) -> BTreeMap<SmolStr, SignalValue> {
        pairs
            .iter()
            .map(|(k, v, is_data)| {
                (
                    SmolStr::new(*k),
                    SignalValue {
                        value: v.clone(),
                        is_data: *is_data,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn scalar_chain_evaluates_in_dependency_order() {
        let brain = Brain::build(&[
            var("c", json!({"expression": "b * 2"})),
            var("b", json!({"expression": "a + 1"})),
        ])
        .unwrap();
        let changed: BTreeSet<SmolStr> = [SmolStr::new("a")].into_iter().collect();
        let (batch, errors) =
            brain.evaluate(&changed, &state(&[("a", json!(3), false)]));
        assert!(errors.is_empty());
        assert_eq!(batch["b"].value, json!(4.0));
        assert_eq!(batch["c"].value, json!(8.0));
    }

    #[test]
    fn cycle_is_a_build_error() {
        let result = Brain::build(&[
            var("a", json!({"expression": "b + 1"})),
            var("b", json!({"expression": "a + 1"})),
        ]);
        assert!(matches!(result, Err(BrainError::Cycle(_))));
    }

    #[test]
    fn frame_filter_and_derive() {
        let brain = Brain::build(&[var(
            "big_sales",
            json!({
                "sourceNames": ["sales"],
                "transformations": [
                    {"type": "filter", "expr": "datum.amount > threshold"},
                    {"type": "derive", "field": "double", "expr": "datum.amount * 2"}
                ]
            }),
        )])
        .unwrap();
        let changed: BTreeSet<SmolStr> = [SmolStr::new("sales")].into_iter().collect();
        let rows = json!([
            {"amount": 5},
            {"amount": 50}
        ]);
        let (batch, errors) = brain.evaluate(
            &changed,
            &state(&[("sales", rows, true), ("threshold", json!(10), false)]),
        );
        assert!(errors.is_empty());
        let derived = &batch["big_sales"];
        assert!(derived.is_data);
        assert_eq!(derived.value, json!([{"amount": 50, "double": 100.0}]));
    }

    #[test]
    fn untouched_nodes_do_not_reevaluate() {
        let brain = Brain::build(&[
            var("x2", json!({"expression": "x * 2"})),
            var("y2", json!({"expression": "y * 2"})),
        ])
        .unwrap();
        let changed: BTreeSet<SmolStr> = [SmolStr::new("x")].into_iter().collect();
        let (batch, _) = brain.evaluate(
            &changed,
            &state(&[("x", json!(1), false), ("y", json!(1), false)]),
        );
        assert!(batch.contains_key("x2"));
        assert!(!batch.contains_key("y2"));
    }

    #[test]
    fn dsv_decoding_types_cells() {
        let value = decode_rows(DataFormat::Csv, None, "name,amount,active\na,1,true\nb,2.5,false")
            .unwrap();
        assert_eq!(
            value,
            json!([
                {"name": "a", "amount": 1.0, "active": true},
                {"name": "b", "amount": 2.5, "active": false}
            ])
        );
    }
}
