use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use super::GatewayError;

/// Generation marker handed out when a query starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueryTicket(u64);

/// Keeps only the latest of several overlapping queries for the same view.
///
/// Each started query takes a ticket; when it finishes, its result is accepted
/// only if no later ticket has been issued in the meantime.
#[derive(Debug, Default)]
pub struct QueryGuard {
    generation: AtomicU64,
}

impl QueryGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> QueryTicket {
        QueryTicket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: QueryTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }

    /// Runs `query` under a fresh ticket and discards its result if it was overtaken.
    pub async fn run<T, F>(&self, query: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        let ticket = self.issue();
        let result = query.await;
        if !self.is_current(ticket) {
            return Err(GatewayError::Superseded);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    #[test]
    fn test_latest_ticket_is_current() {
        let guard = QueryGuard::new();
        let first = guard.issue();
        assert!(guard.is_current(first));
        let second = guard.issue();
        assert!(!guard.is_current(first));
        assert!(guard.is_current(second));
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_slow_query_is_superseded_by_newer_one() {
        let guard = Arc::new(QueryGuard::new());
        let (release, wait) = oneshot::channel::<()>();

        let slow = {
            let guard = guard.clone();
            tokio::spawn(async move {
                guard
                    .run(async move {
                        wait.await.ok();
                        Ok::<_, GatewayError>("module A")
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        // wait until the slow query holds its ticket
        while guard.generation.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let fast = guard.run(async { Ok::<_, GatewayError>("module B") }).await;
        assert_eq!(fast.unwrap(), "module B");

        release.send(()).unwrap();
        assert!(matches!(slow.await.unwrap(), Err(GatewayError::Superseded)));
    }
}
