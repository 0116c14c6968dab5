use chrono::{DateTime, Utc};
use sqlx::SqliteExecutor;

use crate::event::{Commit, PullRequest};

use super::{
    BranchCommitCount, CommitRow, ContributorCommitCount, EventRow, MergeTimeAggregate,
    PrimaryKey, PullRequestRow,
};

pub(crate) async fn insert_event(
    executor: impl SqliteExecutor<'_>,
    event_type: &str,
    branch_name: Option<&str>,
    created_at: DateTime<Utc>,
) -> anyhow::Result<PrimaryKey> {
    let result = sqlx::query(
        "INSERT INTO webhook_event (event_type, branch_name, created_at) VALUES (?, ?, ?)",
    )
    .bind(event_type)
    .bind(branch_name)
    .bind(created_at.timestamp_millis())
    .execute(executor)
    .await?;
    Ok(result.last_insert_rowid())
}

pub(crate) async fn insert_commit(
    executor: impl SqliteExecutor<'_>,
    event_id: PrimaryKey,
    position: i64,
    commit: &Commit,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
INSERT INTO event_commit (event_id, position, message, author, timestamp)
VALUES (?, ?, ?, ?, ?)
"#,
    )
    .bind(event_id)
    .bind(position)
    .bind(&commit.message)
    .bind(&commit.author)
    .bind(commit.timestamp.timestamp_millis())
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn insert_pull_request(
    executor: impl SqliteExecutor<'_>,
    event_id: PrimaryKey,
    pull_request: &PullRequest,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
INSERT INTO pull_request (event_id, title, author, status, created_at, merged_at)
VALUES (?, ?, ?, ?, ?, ?)
"#,
    )
    .bind(event_id)
    .bind(&pull_request.title)
    .bind(&pull_request.author)
    .bind(&pull_request.status)
    .bind(pull_request.created_at.timestamp_millis())
    .bind(pull_request.merged_at.map(|time| time.timestamp_millis()))
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn get_events(executor: impl SqliteExecutor<'_>) -> anyhow::Result<Vec<EventRow>> {
    let events = sqlx::query_as::<_, EventRow>(
        r#"
SELECT id, event_type, branch_name, created_at
FROM webhook_event
ORDER BY created_at DESC, id DESC
"#,
    )
    .fetch_all(executor)
    .await?;
    Ok(events)
}

pub(crate) async fn get_commits(
    executor: impl SqliteExecutor<'_>,
) -> anyhow::Result<Vec<CommitRow>> {
    let commits = sqlx::query_as::<_, CommitRow>(
        r#"
SELECT event_id, message, author, timestamp
FROM event_commit
ORDER BY event_id, position
"#,
    )
    .fetch_all(executor)
    .await?;
    Ok(commits)
}

pub(crate) async fn get_pull_requests(
    executor: impl SqliteExecutor<'_>,
) -> anyhow::Result<Vec<PullRequestRow>> {
    let pull_requests = sqlx::query_as::<_, PullRequestRow>(
        r#"
SELECT event_id, title, author, status, created_at, merged_at
FROM pull_request
"#,
    )
    .fetch_all(executor)
    .await?;
    Ok(pull_requests)
}

pub(crate) async fn count_commits_per_branch(
    executor: impl SqliteExecutor<'_>,
    since: DateTime<Utc>,
) -> anyhow::Result<Vec<BranchCommitCount>> {
    let counts = sqlx::query_as::<_, BranchCommitCount>(
        r#"
SELECT event.branch_name AS branch, COUNT(*) AS commit_count
FROM webhook_event AS event
    JOIN event_commit AS commit_row ON commit_row.event_id = event.id
WHERE event.event_type = 'push'
    AND event.branch_name IS NOT NULL
    AND event.created_at >= ?
GROUP BY event.branch_name
ORDER BY commit_count DESC, branch ASC
"#,
    )
    .bind(since.timestamp_millis())
    .fetch_all(executor)
    .await?;
    Ok(counts)
}

pub(crate) async fn find_most_active_contributor(
    executor: impl SqliteExecutor<'_>,
    since: DateTime<Utc>,
) -> anyhow::Result<Option<ContributorCommitCount>> {
    let contributor = sqlx::query_as::<_, ContributorCommitCount>(
        r#"
SELECT commit_row.author AS author, COUNT(*) AS commit_count
FROM webhook_event AS event
    JOIN event_commit AS commit_row ON commit_row.event_id = event.id
WHERE event.event_type = 'push'
    AND event.created_at >= ?
GROUP BY commit_row.author
ORDER BY commit_count DESC, author ASC
LIMIT 1
"#,
    )
    .bind(since.timestamp_millis())
    .fetch_optional(executor)
    .await?;
    Ok(contributor)
}

pub(crate) async fn get_average_merge_time(
    executor: impl SqliteExecutor<'_>,
    since: DateTime<Utc>,
) -> anyhow::Result<MergeTimeAggregate> {
    let aggregate = sqlx::query_as::<_, MergeTimeAggregate>(
        r#"
SELECT AVG(pr.merged_at - pr.created_at) AS average_ms, COUNT(*) AS merged_count
FROM webhook_event AS event
    JOIN pull_request AS pr ON pr.event_id = event.id
WHERE event.event_type = 'pull_request'
    AND pr.merged_at IS NOT NULL
    AND event.created_at >= ?
"#,
    )
    .bind(since.timestamp_millis())
    .fetch_one(executor)
    .await?;
    Ok(aggregate)
}
