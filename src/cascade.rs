//! Deletion ordering for client and service subtrees.
//!
//! The store enforces no foreign-key cascades, so dependents must be removed
//! before the rows they reference. The dependency graph is declared as data in
//! [`CascadeGraph::standard`] and sorted topologically; a new dependent table
//! is one more `declare` call.

use crate::errors::{AppError, AppResult};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    ServiceDeliverables,
    WorkActivityLogs,
    ServiceReports,
    ClientPayments,
    CalendarEvents,
    Transactions,
    ClientServices,
    Invoices,
    ClientUsers,
    Clients,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServiceDeliverables => "service_deliverables",
            Self::WorkActivityLogs => "work_activity_logs",
            Self::ServiceReports => "service_reports",
            Self::ClientPayments => "client_payments",
            Self::CalendarEvents => "calendar_events",
            Self::Transactions => "transactions",
            Self::ClientServices => "client_services",
            Self::Invoices => "invoices",
            Self::ClientUsers => "client_users",
            Self::Clients => "clients",
        }
    }
}

/// Which identity set selects the rows of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Service,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeNode {
    pub table: Table,
    pub scope: Scope,
}

impl CascadeNode {
    pub const fn new(table: Table, scope: Scope) -> Self {
        Self { table, scope }
    }

    /// Column matched against the scope's identity set.
    pub fn key_column(self) -> &'static str {
        match (self.table, self.scope) {
            (Table::ClientServices, Scope::Service) => "id",
            (Table::Clients, Scope::Client) => "id",
            (_, Scope::Service) => "service_id",
            (_, Scope::Client) => "client_id",
        }
    }
}

const SERVICES: CascadeNode = CascadeNode::new(Table::ClientServices, Scope::Service);
const CLIENT: CascadeNode = CascadeNode::new(Table::Clients, Scope::Client);

#[derive(Debug, Clone)]
struct Dependency {
    node: CascadeNode,
    references: Vec<CascadeNode>,
}

#[derive(Debug, Clone, Default)]
pub struct CascadeGraph {
    dependencies: Vec<Dependency>,
}

impl CascadeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `node`, whose rows point at rows of every node in `references`.
    /// Declaration order breaks ties between nodes that are ready together.
    pub fn declare(mut self, node: CascadeNode, references: &[CascadeNode]) -> Self {
        self.dependencies.push(Dependency {
            node,
            references: references.to_vec(),
        });
        self
    }

    pub fn standard() -> Self {
        use Scope::{Client, Service};
        use Table::*;

        Self::new()
            .declare(CascadeNode::new(ServiceDeliverables, Service), &[SERVICES])
            .declare(CascadeNode::new(WorkActivityLogs, Service), &[SERVICES])
            .declare(CascadeNode::new(ServiceReports, Service), &[SERVICES])
            .declare(CascadeNode::new(ClientPayments, Service), &[SERVICES, CLIENT])
            .declare(CascadeNode::new(CalendarEvents, Service), &[SERVICES])
            .declare(CascadeNode::new(Transactions, Service), &[SERVICES])
            .declare(SERVICES, &[CLIENT])
            .declare(CascadeNode::new(ClientPayments, Client), &[CLIENT])
            .declare(CascadeNode::new(CalendarEvents, Client), &[CLIENT])
            .declare(CascadeNode::new(Transactions, Client), &[CLIENT])
            .declare(CascadeNode::new(Invoices, Client), &[CLIENT])
            .declare(CascadeNode::new(ClientUsers, Client), &[CLIENT])
            .declare(CLIENT, &[])
    }

    /// Every declared node, each before all nodes it references.
    pub fn deletion_order(&self) -> AppResult<Vec<CascadeNode>> {
        let index: HashMap<CascadeNode, usize> = self
            .dependencies
            .iter()
            .enumerate()
            .map(|(position, dependency)| (dependency.node, position))
            .collect();
        if index.len() != self.dependencies.len() {
            return Err(AppError::Internal("cascade graph declares a node twice".to_string()));
        }

        let mut pending_referrers = vec![0usize; self.dependencies.len()];
        for dependency in &self.dependencies {
            for referenced in &dependency.references {
                let Some(&target) = index.get(referenced) else {
                    return Err(AppError::Internal(format!(
                        "cascade graph references undeclared node {}:{:?}",
                        referenced.table.as_str(),
                        referenced.scope
                    )));
                };
                pending_referrers[target] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = pending_referrers
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(position, _)| position)
            .collect();
        let mut order = Vec::with_capacity(self.dependencies.len());

        while let Some(position) = ready.pop_first() {
            let dependency = &self.dependencies[position];
            order.push(dependency.node);
            for referenced in &dependency.references {
                let target = index[referenced];
                pending_referrers[target] -= 1;
                if pending_referrers[target] == 0 {
                    ready.insert(target);
                }
            }
        }

        if order.len() != self.dependencies.len() {
            return Err(AppError::Internal("cascade graph contains a cycle".to_string()));
        }
        Ok(order)
    }

    pub fn plan(&self, root: CascadeRoot) -> AppResult<DeletionPlan> {
        let order = self.deletion_order()?;
        let mut steps = Vec::new();
        for node in order {
            let keys = match &root {
                CascadeRoot::Client { .. } if node == CLIENT => continue,
                CascadeRoot::Client {
                    client_id,
                    service_ids,
                } => match node.scope {
                    Scope::Service => service_ids.clone(),
                    Scope::Client => vec![client_id.clone()],
                },
                CascadeRoot::Service { service_id } => match node.scope {
                    Scope::Service => vec![service_id.clone()],
                    Scope::Client => continue,
                },
            };
            if keys.is_empty() {
                continue;
            }
            steps.push(DeletionStep { node, keys });
        }
        Ok(DeletionPlan { root, steps })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeRoot {
    /// The client row itself is left for the caller to delete.
    Client {
        client_id: String,
        service_ids: Vec<String>,
    },
    /// Removes the service row and everything hanging off it.
    Service { service_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionStep {
    pub node: CascadeNode,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionPlan {
    pub root: CascadeRoot,
    pub steps: Vec<DeletionStep>,
}

pub fn plan_client_deletion(client_id: &str, service_ids: Vec<String>) -> AppResult<DeletionPlan> {
    CascadeGraph::standard().plan(CascadeRoot::Client {
        client_id: client_id.to_string(),
        service_ids,
    })
}

pub fn plan_service_deletion(service_id: &str) -> AppResult<DeletionPlan> {
    CascadeGraph::standard().plan(CascadeRoot::Service {
        service_id: service_id.to_string(),
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedRows {
    pub table: Table,
    pub scope: Scope,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub steps: Vec<DeletedRows>,
}

impl CascadeReport {
    pub fn total_rows(&self) -> usize {
        self.steps.iter().map(|step| step.rows).sum()
    }

    pub fn rows_for(&self, table: Table) -> usize {
        self.steps
            .iter()
            .filter(|step| step.table == table)
            .map(|step| step.rows)
            .sum()
    }
}
