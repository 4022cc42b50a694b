//! Pipeline definition and runner
//!
//! A pipeline is a list of named steps grouped into stages. Stages always
//! run in the order `Teardown`, `Schema`, `Staging`, `Transform`; inside a
//! stage, each step names the steps it depends on and the run order is
//! resolved from those dependencies (ties keep declaration order).
//!
//! Steps run one at a time on the warehouse's single connection. By default
//! every statement is committed as soon as it succeeds and a failure leaves
//! earlier work in place. A transactional run wraps all steps in one
//! transaction and rolls back on failure.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use uuid::Uuid;

use crate::catalog::tables::{CREATE_ORDER, DROP_ORDER};
use crate::catalog::{BulkLoad, Dialect, JsonFormat, Table, TransformQuery};
use crate::warehouse::{EtlConfig, Warehouse, WarehouseError, WarehouseResult};

/// Group of steps; stages run in declaration order of this enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Drop all tables
    Teardown,
    /// Create all tables
    Schema,
    /// Bulk-load the staging tables
    Staging,
    /// Populate dimensions and facts from staging
    Transform,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Teardown, Stage::Schema, Stage::Staging, Stage::Transform];
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "teardown" | "drop" => Ok(Stage::Teardown),
            "schema" | "create" => Ok(Stage::Schema),
            "staging" | "copy" => Ok(Stage::Staging),
            "transform" | "insert" => Ok(Stage::Transform),
            _ => Err(format!(
                "Unknown stage: {}. Use teardown, schema, staging or transform.",
                s
            )),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Teardown => write!(f, "teardown"),
            Stage::Schema => write!(f, "schema"),
            Stage::Staging => write!(f, "staging"),
            Stage::Transform => write!(f, "transform"),
        }
    }
}

/// Work done by a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Statements executed in order
    Sql(Vec<String>),
    /// Bulk load of a staging table
    BulkLoad(BulkLoad),
}

/// A named unit of pipeline work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub stage: Stage,
    /// Steps of the same stage that must run first
    pub depends_on: Vec<String>,
    pub action: StepAction,
}

impl Step {
    pub fn sql(name: impl Into<String>, stage: Stage, statements: Vec<String>) -> Self {
        Self {
            name: name.into(),
            stage,
            depends_on: Vec::new(),
            action: StepAction::Sql(statements),
        }
    }

    pub fn bulk_load(name: impl Into<String>, load: BulkLoad) -> Self {
        Self {
            name: name.into(),
            stage: Stage::Staging,
            depends_on: Vec::new(),
            action: StepAction::BulkLoad(load),
        }
    }

    pub fn after<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    /// SQL text of the step, as sent to Redshift
    pub fn statements(&self) -> Vec<String> {
        match &self.action {
            StepAction::Sql(statements) => statements.clone(),
            StepAction::BulkLoad(load) => vec![load.to_copy_sql()],
        }
    }
}

/// An ordered, validated list of steps
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    /// Build a pipeline, resolving the run order from step dependencies
    ///
    /// Fails on duplicate step names, dependencies that are not declared in
    /// the same stage, and dependency cycles.
    pub fn new(steps: Vec<Step>) -> WarehouseResult<Self> {
        let mut ordered = Vec::with_capacity(steps.len());

        for stage in Stage::ALL {
            let stage_steps: Vec<&Step> = steps.iter().filter(|s| s.stage == stage).collect();
            ordered.extend(Self::order_stage(&stage_steps)?.into_iter().cloned());
        }

        let mut seen = BTreeSet::new();
        for step in &ordered {
            if !seen.insert(step.name.as_str()) {
                return Err(WarehouseError::PipelineError(format!(
                    "Duplicate step name: {}",
                    step.name
                )));
            }
        }

        Ok(Self { steps: ordered })
    }

    fn order_stage<'a>(steps: &[&'a Step]) -> WarehouseResult<Vec<&'a Step>> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..steps.len()).map(|i| graph.add_node(i)).collect();
        let index: HashMap<&str, usize> = steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        for (i, step) in steps.iter().enumerate() {
            for dep in &step.depends_on {
                let &j = index.get(dep.as_str()).ok_or_else(|| {
                    WarehouseError::PipelineError(format!(
                        "Step '{}' depends on unknown step '{}' in stage {}",
                        step.name, dep, step.stage
                    ))
                })?;
                graph.add_edge(nodes[j], nodes[i], ());
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            return Err(WarehouseError::PipelineError(format!(
                "Dependency cycle involving step '{}'",
                steps[graph[cycle.node_id()]].name
            )));
        }

        // Kahn's algorithm, always taking the earliest declared ready step
        let mut remaining: Vec<usize> = nodes
            .iter()
            .map(|&n| graph.neighbors_directed(n, petgraph::Incoming).count())
            .collect();
        let mut ready: BTreeSet<usize> = (0..steps.len()).filter(|&i| remaining[i] == 0).collect();
        let mut ordered = Vec::with_capacity(steps.len());

        while let Some(i) = ready.pop_first() {
            ordered.push(steps[i]);
            for next in graph.neighbors_directed(nodes[i], petgraph::Outgoing) {
                let j = graph[next];
                remaining[j] -= 1;
                if remaining[j] == 0 {
                    ready.insert(j);
                }
            }
        }

        Ok(ordered)
    }

    /// Steps dropping every table, fact table first
    pub fn teardown_steps(dialect: Dialect) -> Vec<Step> {
        DROP_ORDER
            .iter()
            .map(|table| {
                // A table goes after every table that references it
                let referencing: Vec<String> = DROP_ORDER
                    .iter()
                    .filter(|other| other.references().contains(table))
                    .map(|other| format!("drop_{}", other.name()))
                    .collect();
                Step::sql(
                    format!("drop_{}", table.name()),
                    Stage::Teardown,
                    table.drop_sql(dialect),
                )
                .after(referencing)
            })
            .collect()
    }

    /// Steps creating every table, referenced tables first
    pub fn schema_steps(dialect: Dialect) -> Vec<Step> {
        CREATE_ORDER
            .iter()
            .map(|table| {
                let deps: Vec<String> = table
                    .references()
                    .iter()
                    .map(|t| format!("create_{}", t.name()))
                    .collect();
                Step::sql(
                    format!("create_{}", table.name()),
                    Stage::Schema,
                    table.create_sql(dialect),
                )
                .after(deps)
            })
            .collect()
    }

    /// Bulk loads of both staging tables
    pub fn staging_steps(config: &EtlConfig) -> Vec<Step> {
        let region = &config.s3.region;
        let arn = &config.iam_role.arn;
        vec![
            Step::bulk_load(
                "load_staging_events",
                BulkLoad::new(
                    Table::StagingEvents,
                    config.s3.log_data.as_str(),
                    JsonFormat::parse(&config.s3.log_jsonpath),
                    arn.as_str(),
                    region.as_str(),
                ),
            ),
            Step::bulk_load(
                "load_staging_songs",
                BulkLoad::new(
                    Table::StagingSongs,
                    config.s3.song_data.as_str(),
                    JsonFormat::parse(&config.s3.song_jsonpath),
                    arn.as_str(),
                    region.as_str(),
                ),
            ),
        ]
    }

    /// Transform statements with their dependencies
    pub fn transform_steps(dialect: Dialect) -> Vec<Step> {
        TransformQuery::ALL
            .iter()
            .map(|query| {
                Step::sql(query.name(), Stage::Transform, vec![query.sql(dialect)])
                    .after(query.depends_on().iter().map(|d| d.name()))
            })
            .collect()
    }

    /// Drop (optionally) and create all tables
    pub fn setup(dialect: Dialect, drop_first: bool) -> WarehouseResult<Self> {
        let mut steps = Vec::new();
        if drop_first {
            steps.extend(Self::teardown_steps(dialect));
        }
        steps.extend(Self::schema_steps(dialect));
        Self::new(steps)
    }

    /// Staging loads followed by transforms; with `reset`, drop and
    /// recreate all tables first
    pub fn etl(config: &EtlConfig, reset: bool) -> WarehouseResult<Self> {
        let dialect = config.dialect();
        let mut steps = Vec::new();
        if reset {
            steps.extend(Self::teardown_steps(dialect));
            steps.extend(Self::schema_steps(dialect));
        }
        steps.extend(Self::staging_steps(config));
        steps.extend(Self::transform_steps(dialect));
        Self::new(steps)
    }

    /// Steps in run order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Step names in run order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Keep only the steps of one stage
    pub fn only(mut self, stage: Stage) -> Self {
        self.steps.retain(|s| s.stage == stage);
        self
    }

    /// Run every step in order
    pub async fn run(
        &self,
        warehouse: &dyn Warehouse,
        options: RunOptions,
    ) -> WarehouseResult<RunReport> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();

        tracing::info!(
            %run_id,
            backend = warehouse.backend_type(),
            steps = self.steps.len(),
            transactional = options.transactional,
            "Starting pipeline run"
        );

        if options.transactional {
            warehouse.begin().await?;
        }

        let mut reports = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            match Self::run_step(warehouse, step).await {
                Ok(report) => reports.push(report),
                Err(source) => {
                    tracing::error!(%run_id, step = %step.name, "Step failed: {}", source);
                    if options.transactional
                        && let Err(e) = warehouse.rollback().await
                    {
                        tracing::warn!(%run_id, "Rollback failed: {}", e);
                    }
                    return Err(WarehouseError::StepFailed {
                        step: step.name.clone(),
                        source: Box::new(source),
                    });
                }
            }
        }

        if options.transactional {
            warehouse.commit().await?;
        }

        let report = RunReport {
            run_id,
            steps: reports,
            duration: started.elapsed(),
        };

        tracing::info!(
            %run_id,
            rows = report.total_rows(),
            elapsed_ms = report.duration.as_millis() as u64,
            "Pipeline run complete"
        );

        Ok(report)
    }

    async fn run_step(warehouse: &dyn Warehouse, step: &Step) -> WarehouseResult<StepReport> {
        let started = Instant::now();
        tracing::info!(step = %step.name, stage = %step.stage, "Running step");

        let rows_affected = match &step.action {
            StepAction::Sql(statements) => {
                let mut rows = 0;
                for sql in statements {
                    tracing::debug!(step = %step.name, "{}", sql);
                    rows += warehouse.execute(sql).await?;
                }
                rows
            }
            StepAction::BulkLoad(load) => {
                tracing::debug!(step = %step.name, "{}", load.to_copy_sql());
                warehouse.bulk_load(load).await?
            }
        };

        let report = StepReport {
            name: step.name.clone(),
            stage: step.stage,
            rows_affected,
            duration: started.elapsed(),
        };

        tracing::info!(
            step = %report.name,
            rows = report.rows_affected,
            elapsed_ms = report.duration.as_millis() as u64,
            "Step complete"
        );

        Ok(report)
    }
}

/// Options for a pipeline run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Run all steps in one transaction
    pub transactional: bool,
}

impl RunOptions {
    pub fn from_config(config: &EtlConfig) -> Self {
        Self {
            transactional: config.pipeline.transactional,
        }
    }
}

/// Outcome of one step
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: String,
    pub stage: Stage,
    pub rows_affected: u64,
    #[serde(skip)]
    pub duration: Duration,
}

/// Outcome of a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub steps: Vec<StepReport>,
    #[serde(skip)]
    pub duration: Duration,
}

impl RunReport {
    /// Rows affected across all steps
    pub fn total_rows(&self) -> u64 {
        self.steps.iter().map(|s| s.rows_affected).sum()
    }

    /// Report of a step by name
    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.name == name)
    }
}
