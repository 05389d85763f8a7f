//! Eager association loading
//!
//! Given loaded entities and a requested association graph, one fetch task
//! is planned per (entity, requested association). All tasks are issued
//! together and joined as a unit: the first failure fails the whole
//! resolution, and results are attached in plan order once every task has
//! completed. Names the type does not declare are skipped.
//!
//! Each association's subtree is forwarded to the dependent fetch, so a
//! request such as `pets -> owner` loads two levels.
//!
//! | Kind | Local value | Target query |
//! |------|-------------|--------------|
//! | belongsTo | foreign key (default: target primary) | `on = fk`, `on` defaults to target primary |
//! | hasOne | this primary (or `fk`) | first row where `on = value`, `on` defaults to this primary |
//! | hasMany | this primary (or `fk`) | every row where `on = value` |

use crate::clause::WhereSpec;
use crate::entity::{Entity, Related};
use crate::keyspace::{has_many_array, Registered};
use crate::model::{Model, Query};
use crate::schema::{Association, AssociationKind};
use casio_core::{Result, Value};
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use tracing::debug;

/// Requested association graph
///
/// Entries keep request order; each carries the graph to load on the
/// fetched entities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EagerSpec {
    entries: Vec<(String, EagerSpec)>,
}

impl EagerSpec {
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `name` with nothing below it
    pub fn with(self, name: &str) -> Self {
        self.nested(name, EagerSpec::new())
    }

    /// Load `name` and then `graph` on its results
    pub fn nested(mut self, name: &str, graph: EagerSpec) -> Self {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = graph,
            None => self.entries.push((name.to_string(), graph)),
        }
        self
    }

    /// Requested names with their subgraphs, in request order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &EagerSpec)> {
        self.entries.iter().map(|(n, g)| (n.as_str(), g))
    }

    /// Subgraph requested under `name`
    pub fn get(&self, name: &str) -> Option<&EagerSpec> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, g)| g)
    }

    /// True when nothing is requested
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<&[&str]> for EagerSpec {
    fn from(names: &[&str]) -> Self {
        names.iter().fold(EagerSpec::new(), |g, n| g.with(n))
    }
}

impl<const N: usize> From<[&str; N]> for EagerSpec {
    fn from(names: [&str; N]) -> Self {
        EagerSpec::from(&names[..])
    }
}

impl From<&str> for EagerSpec {
    fn from(name: &str) -> Self {
        EagerSpec::new().with(name)
    }
}

/// One planned fetch
struct Task {
    entity: usize,
    name: String,
    target: Model,
    kind: AssociationKind,
    on: String,
    value: Value,
    graph: EagerSpec,
}

/// Load `eager` onto every entity in `entities`
pub(crate) async fn resolve(model: &Model, entities: &mut [Entity], eager: &EagerSpec) -> Result<()> {
    let mut tasks = Vec::new();
    for (index, entity) in entities.iter_mut().enumerate() {
        entity.set_eager_graph(eager.clone());
        for (name, graph) in eager.entries() {
            let Some(association) = model.schema().association(name) else {
                debug!(target: "casio::association", family = model.name(), name, "Ignoring unknown association");
                continue;
            };
            tasks.push(plan(model, entity, index, name, association, graph)?);
        }
    }
    if tasks.is_empty() {
        return Ok(());
    }

    debug!(target: "casio::association", family = model.name(), tasks = tasks.len(), "Resolving associations");
    let slots: Vec<(usize, String)> = tasks.iter().map(|t| (t.entity, t.name.clone())).collect();
    let results = try_join_all(tasks.into_iter().map(fetch)).await?;
    for ((index, name), related) in slots.into_iter().zip(results) {
        entities[index].attach(&name, related);
    }
    Ok(())
}

fn plan(
    model: &Model,
    entity: &Entity,
    index: usize,
    name: &str,
    association: &Association,
    graph: &EagerSpec,
) -> Result<Task> {
    let keyspace = model.keyspace();
    if association.kind == AssociationKind::HasMany {
        if let Some(Registered::Array(_)) = keyspace.lookup(&association.target) {
            return Err(has_many_array(model.name(), name));
        }
    }
    let target = keyspace.model_named(&association.target)?;

    let (on, local) = match association.kind {
        AssociationKind::BelongsTo => {
            let target_primary = target.schema().require_primary()?;
            (
                association.on.as_deref().unwrap_or(target_primary).to_string(),
                association.local.as_deref().unwrap_or(target_primary).to_string(),
            )
        }
        AssociationKind::HasOne | AssociationKind::HasMany => {
            let primary = model.schema().require_primary()?;
            (
                association.on.as_deref().unwrap_or(primary).to_string(),
                association.local.as_deref().unwrap_or(primary).to_string(),
            )
        }
    };

    Ok(Task {
        entity: index,
        name: name.to_string(),
        value: entity.get(&local),
        target,
        kind: association.kind,
        on,
        graph: graph.clone(),
    })
}

fn fetch(task: Task) -> BoxFuture<'static, Result<Related>> {
    async move {
        let Task {
            target,
            kind,
            on,
            value,
            graph,
            ..
        } = task;

        if !value.is_present() {
            return Ok(match kind {
                AssociationKind::HasMany => Related::Many(Vec::new()),
                _ => Related::One(None),
            });
        }

        let by_key = target.schema().primary() == Some(on.as_str());
        let filter = if by_key {
            WhereSpec::Id(value)
        } else {
            WhereSpec::clause_with(format!("{on}=:{on}"), &on, value)
        };
        let mut query = Query::new().filter(filter);
        if !graph.is_empty() {
            query = query.eager(graph);
        }

        match kind {
            AssociationKind::HasMany => Ok(Related::Many(target.find(query).await?)),
            _ if by_key => Ok(Related::One(target.get(query).await?.map(Box::new))),
            _ => {
                let found = target.find(query.limit(1)).await?;
                Ok(Related::One(found.into_iter().next().map(Box::new)))
            }
        }
    }
    .boxed()
}
