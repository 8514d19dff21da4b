use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// レポート対象期間（UTC、両端を含む）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportWindow {
    /// 開始・終了時刻から期間を作成（`start < end` が必須）
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(Error::InvalidInput(format!(
                "report window start {} must be before end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// 指定時刻から遡ってN日間の期間
    pub fn ending_at(end: DateTime<Utc>, days: u32) -> Result<Self> {
        if days == 0 {
            return Err(Error::InvalidInput("--days must be at least 1".to_string()));
        }
        Self::new(end - Duration::days(i64::from(days)), end)
    }

    /// 最近N日の期間
    pub fn last_days(days: u32) -> Result<Self> {
        Self::ending_at(Utc::now(), days)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// 課題取得を絞り込むJQL条件
    ///
    /// 期間内に更新された課題と未完了の課題を対象にする。タイムゾーン差を
    /// 吸収するため開始時刻は1日早める。
    pub fn to_jql_condition(&self) -> String {
        let since = self.start - Duration::days(1);
        format!(
            "(updated >= \"{}\" OR statusCategory != Done)",
            format_jira_datetime(&since)
        )
    }

    /// ヘッダー表示用 `2024-01-01 to 2024-01-08`
    pub fn describe(&self) -> String {
        format!(
            "{} to {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// DateTime<Utc>をJQL用の日時文字列にフォーマット
fn format_jira_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y/%m/%d %H:%M").to_string()
}
