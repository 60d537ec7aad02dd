//! Role-inclusion graph resolution (C5).
//!
//! Roles inherit from other roles through `RoleInclusion` edges. Forward
//! expansion (a user's directly-granted roles out to everything they
//! transitively include) feeds permission assembly (C6); reverse expansion
//! (every role that transitively includes a given role) feeds cache
//! invalidation on write (C8). Both are plain BFS over the same edge set,
//! walked in opposite directions, guarded by a visited set since the graph
//! is only *supposed* to be acyclic (§3 invariant).

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use authz_database::AuthzRepository;
use chrono::Utc;
use tracing::instrument;

use crate::errors::AuthzResult;

pub struct RoleResolver {
    repository: Arc<dyn AuthzRepository>,
}

impl RoleResolver {
    pub fn new(repository: Arc<dyn AuthzRepository>) -> Self {
        Self { repository }
    }

    /// The full set of roles a user effectively holds right now: their
    /// directly-granted active roles, plus everything those roles
    /// transitively include (§4.5).
    #[instrument(skip(self), fields(biz_id, user_id))]
    pub async fn effective_role_ids(&self, biz_id: i64, user_id: i64) -> AuthzResult<Vec<i64>> {
        let now = Utc::now();
        let direct = self.repository.find_active_user_roles(biz_id, user_id, now).await?;
        let seeds: Vec<i64> = direct.iter().map(|ur| ur.role_id).collect();
        self.expand_forward(biz_id, seeds).await
    }

    /// BFS outward along `including -> included` edges: starting from
    /// `seeds`, repeatedly fetch everything those roles include, until no
    /// new role is discovered.
    #[instrument(skip(self, seeds), fields(biz_id))]
    pub async fn expand_forward(&self, biz_id: i64, seeds: Vec<i64>) -> AuthzResult<Vec<i64>> {
        let mut visited: HashSet<i64> = seeds.iter().copied().collect();
        let mut frontier: VecDeque<i64> = seeds.into();

        while !frontier.is_empty() {
            let batch: Vec<i64> = frontier.drain(..).collect();
            let edges = self.repository.find_inclusions_by_including_ids(biz_id, &batch).await?;
            for edge in edges {
                if visited.insert(edge.included_role_id) {
                    frontier.push_back(edge.included_role_id);
                }
            }
        }

        let mut result: Vec<i64> = visited.into_iter().collect();
        result.sort_unstable();
        Ok(result)
    }

    /// BFS backward along `included -> including` edges: every role that
    /// transitively includes `role_id`, used by C8 to find which users'
    /// cached permissions a role-graph edit might have touched.
    #[instrument(skip(self), fields(biz_id, role_id))]
    pub async fn expand_backward(&self, biz_id: i64, role_id: i64) -> AuthzResult<Vec<i64>> {
        let mut visited: HashSet<i64> = HashSet::from([role_id]);
        let mut frontier: VecDeque<i64> = VecDeque::from([role_id]);

        while !frontier.is_empty() {
            let batch: Vec<i64> = frontier.drain(..).collect();
            let edges = self.repository.find_inclusions_by_included_ids(biz_id, &batch).await?;
            for edge in edges {
                if visited.insert(edge.including_role_id) {
                    frontier.push_back(edge.including_role_id);
                }
            }
        }

        let mut result: Vec<i64> = visited.into_iter().collect();
        result.sort_unstable();
        Ok(result)
    }
}
