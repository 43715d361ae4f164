use std::collections::HashSet;
use std::sync::RwLock;
use crate::error::{Error, Result};
use crate::types::ids::OperatorId;

/// External authorization check in front of every registry mutation.
pub trait AdminGate: Send + Sync {
    fn authorize(&self, operator: OperatorId) -> Result<()>;
}

/// Default gate: a fixed set of operators may mutate the registry.
pub struct OperatorAllowList {
    operators: RwLock<HashSet<OperatorId>>,
}

impl OperatorAllowList {
    pub fn new(operators: impl IntoIterator<Item = OperatorId>) -> Self {
        OperatorAllowList {
            operators: RwLock::new(operators.into_iter().collect()),
        }
    }

    pub fn add_operator(&self, operator_id: OperatorId) {
        if let Ok(mut operators) = self.operators.write() {
            operators.insert(operator_id);
            tracing::info!("Added authorized operator: {}", operator_id);
        }
    }

    pub fn remove_operator(&self, operator_id: OperatorId) {
        if let Ok(mut operators) = self.operators.write() {
            operators.remove(&operator_id);
            tracing::info!("Removed authorized operator: {}", operator_id);
        }
    }

    pub fn is_authorized(&self, operator_id: OperatorId) -> bool {
        if let Ok(operators) = self.operators.read() {
            operators.contains(&operator_id)
        } else {
            false
        }
    }
}

impl AdminGate for OperatorAllowList {
    fn authorize(&self, operator: OperatorId) -> Result<()> {
        if self.is_authorized(operator) {
            Ok(())
        } else {
            tracing::warn!(%operator, "Rejected registry mutation from unauthorized operator");
            Err(Error::Unauthorized(operator))
        }
    }
}
