//! 複数ボードの並行処理
//!
//! 各ボードは独立して処理され、1つのボードの失敗が他を止めることはない。
//! 結果は入力順で返す。

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::{Error, Result};

pub const MAX_CONCURRENCY: usize = 8;

/// ボード1件の処理結果
#[derive(Debug)]
pub struct BoardOutcome<T> {
    pub board_id: u64,
    pub result: Result<T>,
}

#[derive(Debug)]
pub struct BatchResult<T> {
    /// 入力順
    pub outcomes: Vec<BoardOutcome<T>>,
}

impl<T> BatchResult<T> {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (u64, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.board_id, e)))
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// `3 succeeded, 1 failed (board 12: Not found: board 12)`
    pub fn summary(&self) -> String {
        let failures: Vec<String> = self
            .failures()
            .map(|(id, e)| format!("board {}: {}", id, e))
            .collect();
        if failures.is_empty() {
            format!("{} succeeded, 0 failed", self.succeeded())
        } else {
            format!(
                "{} succeeded, {} failed ({})",
                self.succeeded(),
                failures.len(),
                failures.join("; ")
            )
        }
    }
}

/// 並行数を 1..=8 に丸める
pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(1, MAX_CONCURRENCY)
}

/// ボードごとに `task` を実行（最大 `concurrency` 件を同時に処理）
pub async fn run_boards<T, F, Fut>(board_ids: Vec<u64>, concurrency: usize, task: F) -> BatchResult<T>
where
    T: Send + 'static,
    F: Fn(u64) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let concurrency = clamp_concurrency(concurrency);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut set = JoinSet::new();
    info!(boards = board_ids.len(), concurrency, "processing boards");

    for (index, board_id) in board_ids.iter().copied().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let fut = task(board_id);
        set.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => fut.await,
                Err(e) => Err(Error::Unexpected(format!("worker pool closed: {}", e))),
            };
            (index, result)
        });
    }

    let mut slots: Vec<Option<Result<T>>> = board_ids.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => {
                if let Err(e) = &result {
                    warn!(board_id = board_ids[index], error = %e, "board failed");
                }
                slots[index] = Some(result);
            }
            Err(e) => warn!(error = %e, "board task aborted"),
        }
    }

    let outcomes = board_ids
        .into_iter()
        .zip(slots)
        .map(|(board_id, slot)| BoardOutcome {
            board_id,
            result: slot.unwrap_or_else(|| Err(Error::Unexpected(format!("board {} task aborted", board_id)))),
        })
        .collect();

    BatchResult { outcomes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_clamp_concurrency() {
        assert_eq!(clamp_concurrency(0), 1);
        assert_eq!(clamp_concurrency(4), 4);
        assert_eq!(clamp_concurrency(64), MAX_CONCURRENCY);
    }

    #[tokio::test]
    async fn test_outcomes_keep_input_order_and_failures_are_isolated() {
        // Given: 2番目のボードだけ失敗する処理
        let boards = vec![30, 10, 20];

        // When
        let result = run_boards(boards, 3, |id| async move {
            // 後のボードほど早く終わるようにする
            tokio::time::sleep(Duration::from_millis(id)).await;
            if id == 10 {
                Err(Error::NotFound(format!("board {}", id)))
            } else {
                Ok(id * 2)
            }
        })
        .await;

        // Then: 入力順のまま、失敗は1件のみ
        let ids: Vec<u64> = result.outcomes.iter().map(|o| o.board_id).collect();
        assert_eq!(ids, vec![30, 10, 20]);
        assert_eq!(result.outcomes[0].result.as_ref().unwrap(), &60);
        assert!(result.outcomes[1].result.is_err());
        assert_eq!(result.succeeded(), 2);
        assert!(result.has_failures());
        assert_eq!(result.summary(), "2 succeeded, 1 failed (board 10: Not found: board 10)");
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let result = run_boards((1..=6).collect(), 2, |_| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(result.succeeded(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(result.summary(), "6 succeeded, 0 failed");
    }
}
