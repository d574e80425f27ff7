//! Task definitions, per-player progress, and atomic reward payout

use sqlx::SqlitePool;
use terminus_core::{
    Error, Result, RewardRouting, TaskDefinition, TaskKind, TaskProgress, TaskView,
};

use super::players::{self, CreditOptions};

#[derive(Debug, sqlx::FromRow)]
struct DefinitionRow {
    id: i64,
    title: String,
    reward_coins: i64,
    routing: String,
    kind: String,
}

impl TryFrom<DefinitionRow> for TaskDefinition {
    type Error = Error;

    fn try_from(row: DefinitionRow) -> Result<Self> {
        let routing = match row.routing.as_str() {
            "coin" => RewardRouting::Coin,
            "league_score" => RewardRouting::LeagueScore,
            other => {
                return Err(Error::InvalidData(format!(
                    "unknown reward routing: {other}"
                )))
            }
        };
        let kind: TaskKind = serde_json::from_str(&row.kind)?;
        Ok(TaskDefinition {
            id: row.id,
            title: row.title,
            reward_coins: row.reward_coins,
            routing,
            kind,
        })
    }
}

fn routing_str(routing: RewardRouting) -> &'static str {
    match routing {
        RewardRouting::Coin => "coin",
        RewardRouting::LeagueScore => "league_score",
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProgressRow {
    player_id: String,
    task_id: i64,
    completed: bool,
    stage: i64,
    stage_entered_at: Option<chrono::DateTime<chrono::Utc>>,
    last_completed_date: Option<chrono::NaiveDate>,
    streak_days: i64,
}

impl From<ProgressRow> for TaskProgress {
    fn from(row: ProgressRow) -> Self {
        TaskProgress {
            player_id: row.player_id,
            task_id: row.task_id,
            completed: row.completed,
            stage: row.stage,
            stage_entered_at: row.stage_entered_at,
            last_completed_date: row.last_completed_date,
            streak_days: row.streak_days,
        }
    }
}

/// Insert a definition and seed a progress row for every existing
/// player, as one transaction. Returns the assigned definition id.
pub async fn add_definition_for_all(
    pool: &SqlitePool,
    title: &str,
    reward_coins: i64,
    routing: RewardRouting,
    kind: &TaskKind,
) -> Result<i64> {
    let kind_json = serde_json::to_string(kind)?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    let result = sqlx::query(
        "INSERT INTO task_definitions (title, reward_coins, routing, kind) VALUES (?, ?, ?, ?)",
    )
    .bind(title)
    .bind(reward_coins)
    .bind(routing_str(routing))
    .bind(&kind_json)
    .execute(&mut *tx)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    let task_id = result.last_insert_rowid();

    sqlx::query(
        "INSERT OR IGNORE INTO task_progress (player_id, task_id) SELECT player_id, ? FROM players",
    )
    .bind(task_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    tx.commit()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(task_id)
}

/// List every task definition
pub async fn list_definitions(pool: &SqlitePool) -> Result<Vec<TaskDefinition>> {
    let rows: Vec<DefinitionRow> = sqlx::query_as(
        "SELECT id, title, reward_coins, routing, kind FROM task_definitions ORDER BY id",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    rows.into_iter().map(TaskDefinition::try_from).collect()
}

/// List all definition ids (player creation seeds one progress row each)
pub async fn list_definition_ids(pool: &SqlitePool) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM task_definitions ORDER BY id")
        .fetch_all(pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Get one definition by id
pub async fn get_definition(pool: &SqlitePool, task_id: i64) -> Result<TaskDefinition> {
    let row: Option<DefinitionRow> = sqlx::query_as(
        "SELECT id, title, reward_coins, routing, kind FROM task_definitions WHERE id = ?",
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    row.map(TaskDefinition::try_from)
        .transpose()?
        .ok_or(Error::TaskNotFound(task_id))
}

/// Get a player's progress against one task
pub async fn get_progress(
    pool: &SqlitePool,
    player_id: &str,
    task_id: i64,
) -> Result<TaskProgress> {
    let row: Option<ProgressRow> = sqlx::query_as(
        r#"
        SELECT player_id, task_id, completed, stage, stage_entered_at,
               last_completed_date, streak_days
        FROM task_progress WHERE player_id = ? AND task_id = ?
        "#,
    )
    .bind(player_id)
    .bind(task_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    row.map(TaskProgress::from).ok_or(Error::TaskNotFound(task_id))
}

/// List a player's tasks joined with their definitions, for snapshots
pub async fn list_task_views(pool: &SqlitePool, player_id: &str) -> Result<Vec<TaskView>> {
    #[derive(sqlx::FromRow)]
    struct JoinedRow {
        task_id: i64,
        title: String,
        reward_coins: i64,
        routing: String,
        kind: String,
        completed: bool,
        stage: i64,
        last_completed_date: Option<chrono::NaiveDate>,
    }

    let rows: Vec<JoinedRow> = sqlx::query_as(
        r#"
        SELECT p.task_id, d.title, d.reward_coins, d.routing, d.kind,
               p.completed, p.stage, p.last_completed_date
        FROM task_progress p
        JOIN task_definitions d ON d.id = p.task_id
        WHERE p.player_id = ?
        ORDER BY p.task_id
        "#,
    )
    .bind(player_id)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    rows.into_iter()
        .map(|row| {
            let routing = match row.routing.as_str() {
                "league_score" => RewardRouting::LeagueScore,
                _ => RewardRouting::Coin,
            };
            let kind: TaskKind = serde_json::from_str(&row.kind)?;
            Ok(TaskView {
                task_id: row.task_id,
                title: row.title,
                reward_coins: row.reward_coins,
                routing,
                kind,
                completed: row.completed,
                stage: row.stage,
                last_completed_date: row.last_completed_date,
            })
        })
        .collect()
}

/// Persist a progress row as-is (stage advances, recurring resets)
pub async fn save_progress(pool: &SqlitePool, progress: &TaskProgress) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    save_progress_in_tx(&mut tx, progress).await?;

    tx.commit()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))
}

async fn save_progress_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    progress: &TaskProgress,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE task_progress
        SET completed = ?, stage = ?, stage_entered_at = ?, last_completed_date = ?,
            streak_days = ?
        WHERE player_id = ? AND task_id = ?
        "#,
    )
    .bind(progress.completed)
    .bind(progress.stage)
    .bind(progress.stage_entered_at)
    .bind(progress.last_completed_date)
    .bind(progress.streak_days)
    .bind(&progress.player_id)
    .bind(progress.task_id)
    .execute(&mut **tx)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// Persist a finished progress row and pay its reward, as one transaction.
///
/// Coin-routed rewards run through the shared credit path so the
/// referral cascade applies; league-routed rewards land in the free
/// score bucket instead.
pub async fn complete_with_reward(
    pool: &SqlitePool,
    progress: &TaskProgress,
    reward_coins: i64,
    routing: RewardRouting,
    credit: CreditOptions,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    save_progress_in_tx(&mut tx, progress).await?;

    match routing {
        RewardRouting::Coin => {
            players::credit_in_tx(&mut tx, &progress.player_id, reward_coins, &credit).await?;
        }
        RewardRouting::LeagueScore => {
            sqlx::query(
                r#"
                INSERT INTO league_standings (player_id, score, free_score)
                VALUES (?, ?, ?)
                ON CONFLICT (player_id) DO UPDATE SET
                    score = score + excluded.score,
                    free_score = free_score + excluded.free_score
                "#,
            )
            .bind(&progress.player_id)
            .bind(reward_coins)
            .bind(reward_coins)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;
        }
    }

    tx.commit()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))
}
