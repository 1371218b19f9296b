use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geo_types::Geometry;
use geozero::wkb;
use sqlx::{
    postgres::PgPoolOptions, types::Json, Acquire, Executor, Pool, Postgres, Row, Transaction,
};
use uuid::Uuid;

use super::Store;
use crate::conflict::Commitment;
use crate::entities::{Bid, Driver, Job, JobLedger};
use crate::error::Error;

type Database = Postgres;

const SCHEMA: [&str; 8] = [
    "CREATE EXTENSION IF NOT EXISTS postgis",
    "CREATE TABLE IF NOT EXISTS jobs (id UUID PRIMARY KEY, organization_id UUID NOT NULL, status VARCHAR NOT NULL, pickup_at TIMESTAMPTZ NOT NULL, deleted_at TIMESTAMPTZ, data JSONB NOT NULL)",
    "CREATE TABLE IF NOT EXISTS drivers (id UUID PRIMARY KEY, approved BOOLEAN NOT NULL, base geometry(Point, 4326), data JSONB NOT NULL)",
    "CREATE TABLE IF NOT EXISTS bids (id UUID PRIMARY KEY, job_id UUID NOT NULL REFERENCES jobs(id), driver_id UUID NOT NULL REFERENCES drivers(id), status VARCHAR NOT NULL, expires_at TIMESTAMPTZ, data JSONB NOT NULL)",
    // at most one accepted or confirmed bid per job
    "CREATE UNIQUE INDEX IF NOT EXISTS bids_one_committed_per_job ON bids (job_id) WHERE status IN ('accepted', 'confirmed')",
    // at most one live bid per driver and job
    "CREATE UNIQUE INDEX IF NOT EXISTS bids_one_open_per_driver ON bids (job_id, driver_id) WHERE status IN ('pending', 'accepted')",
    "CREATE INDEX IF NOT EXISTS bids_lapsed ON bids (expires_at) WHERE status = 'accepted'",
    "CREATE INDEX IF NOT EXISTS bids_by_driver ON bids (driver_id, status)",
];

const UNIQUE_VIOLATION: &str = "23505";

pub struct PgStore {
    pool: Pool<Database>,
}

impl PgStore {
    #[tracing::instrument(name = "PgStore::new", skip_all)]
    pub async fn new(db_uri: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(db_uri)
            .await?;

        for statement in SCHEMA {
            pool.execute(statement).await?;
        }

        Ok(Self { pool })
    }
}

/// Unique index violations mean a concurrent transition won the race.
fn constraint_error(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            tracing::info!(constraint = ?db_err.constraint(), "unique constraint rejected write");
            match db_err.constraint() {
                Some("bids_one_open_per_driver") => Error::duplicate_bid_error(),
                _ => Error::already_decided_error(),
            }
        }
        _ => Error::from(err),
    }
}

#[tracing::instrument(skip(tx))]
async fn fetch_job_for_update(tx: &mut Transaction<'_, Database>, id: &Uuid) -> Result<Job, Error> {
    let Json(job): Json<Job> = tx
        .fetch_optional(sqlx::query("SELECT data FROM jobs WHERE id = $1 FOR UPDATE").bind(id))
        .await?
        .ok_or_else(Error::job_not_found_error)?
        .try_get("data")?;

    Ok(job)
}

#[tracing::instrument(skip(tx))]
async fn fetch_bids_for_update(
    tx: &mut Transaction<'_, Database>,
    job_id: &Uuid,
) -> Result<Vec<Bid>, Error> {
    let rows = tx
        .fetch_all(
            sqlx::query("SELECT data FROM bids WHERE job_id = $1 ORDER BY id FOR UPDATE")
                .bind(job_id),
        )
        .await?;

    let mut bids = vec![];
    for row in rows.iter() {
        let Json(bid): Json<Bid> = row.try_get("data")?;
        bids.push(bid);
    }

    bids.sort_by_key(|bid| (bid.created_at, bid.id));
    Ok(bids)
}

#[tracing::instrument(skip(tx))]
async fn fetch_driver_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Driver, Error> {
    let Json(driver): Json<Driver> = tx
        .fetch_optional(sqlx::query("SELECT data FROM drivers WHERE id = $1 FOR UPDATE").bind(id))
        .await?
        .ok_or_else(Error::driver_not_found_error)?
        .try_get("data")?;

    Ok(driver)
}

#[tracing::instrument(skip(tx, job), fields(job_id = %job.id))]
async fn update_job(tx: &mut Transaction<'_, Database>, job: &Job) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE jobs SET status = $2, pickup_at = $3, deleted_at = $4, data = $5 WHERE id = $1")
            .bind(&job.id)
            .bind(job.status.name())
            .bind(job.pickup_at)
            .bind(job.deleted_at)
            .bind(Json(job)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx, bid), fields(bid_id = %bid.id))]
async fn upsert_bid(tx: &mut Transaction<'_, Database>, bid: &Bid) -> Result<(), Error> {
    tx.execute(
        sqlx::query(
            "INSERT INTO bids (id, job_id, driver_id, status, expires_at, data) VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, expires_at = EXCLUDED.expires_at, data = EXCLUDED.data",
        )
        .bind(&bid.id)
        .bind(&bid.job_id)
        .bind(&bid.driver_id)
        .bind(bid.status.name())
        .bind(bid.expires_at())
        .bind(Json(bid)),
    )
    .await
    .map_err(constraint_error)?;

    Ok(())
}

#[tracing::instrument(skip(tx, driver), fields(driver_id = %driver.id))]
async fn update_driver(tx: &mut Transaction<'_, Database>, driver: &Driver) -> Result<(), Error> {
    let base: Option<wkb::Encode<Geometry<f64>>> = driver
        .base
        .as_ref()
        .map(|base| wkb::Encode(base.coordinates.into()));

    tx.execute(
        sqlx::query(
            "UPDATE drivers SET approved = $2, base = ST_SetSRID($3, 4326), data = $4 WHERE id = $1",
        )
        .bind(&driver.id)
        .bind(driver.approved)
        .bind(base)
        .bind(Json(driver)),
    )
    .await?;

    Ok(())
}

#[async_trait]
impl Store for PgStore {
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id))]
    async fn insert_job(&self, job: &Job) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query(
                "INSERT INTO jobs (id, organization_id, status, pickup_at, deleted_at, data) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&job.id)
            .bind(&job.organization_id)
            .bind(job.status.name())
            .bind(job.pickup_at)
            .bind(job.deleted_at)
            .bind(Json(job)),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_job(&self, id: Uuid) -> Result<Job, Error> {
        let mut conn = self.pool.acquire().await?;

        let Json(job): Json<Job> = conn
            .fetch_optional(sqlx::query("SELECT data FROM jobs WHERE id = $1").bind(&id))
            .await?
            .ok_or_else(Error::job_not_found_error)?
            .try_get("data")?;

        Ok(job)
    }

    #[tracing::instrument(skip(self))]
    async fn open_jobs(&self) -> Result<Vec<Job>, Error> {
        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(sqlx::query(
                "SELECT data FROM jobs WHERE status IN ('open', 'expired_reopened') AND deleted_at IS NULL",
            ))
            .await?;

        let mut jobs = vec![];
        for row in rows.iter() {
            let Json(job): Json<Job> = row.try_get("data")?;
            jobs.push(job);
        }

        Ok(jobs)
    }

    #[tracing::instrument(skip(self, driver), fields(driver_id = %driver.id))]
    async fn insert_driver(&self, driver: &Driver) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        tx.execute(
            sqlx::query("INSERT INTO drivers (id, approved, data) VALUES ($1, $2, $3)")
                .bind(&driver.id)
                .bind(driver.approved)
                .bind(Json(driver)),
        )
        .await?;

        // writes the base geometry column
        update_driver(&mut tx, driver).await?;

        tx.commit().await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_driver(&self, id: Uuid) -> Result<Driver, Error> {
        let mut conn = self.pool.acquire().await?;

        let Json(driver): Json<Driver> = conn
            .fetch_optional(sqlx::query("SELECT data FROM drivers WHERE id = $1").bind(&id))
            .await?
            .ok_or_else(Error::driver_not_found_error)?
            .try_get("data")?;

        Ok(driver)
    }

    #[tracing::instrument(skip(self))]
    async fn approved_drivers(&self) -> Result<Vec<Driver>, Error> {
        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(sqlx::query(
                "SELECT data FROM drivers WHERE approved AND base IS NOT NULL",
            ))
            .await?;

        let mut drivers = vec![];
        for row in rows.iter() {
            let Json(driver): Json<Driver> = row.try_get("data")?;
            drivers.push(driver);
        }

        Ok(drivers)
    }

    #[tracing::instrument(skip(self))]
    async fn find_bid(&self, id: Uuid) -> Result<Bid, Error> {
        let mut conn = self.pool.acquire().await?;

        let Json(bid): Json<Bid> = conn
            .fetch_optional(sqlx::query("SELECT data FROM bids WHERE id = $1").bind(&id))
            .await?
            .ok_or_else(Error::bid_not_found_error)?
            .try_get("data")?;

        Ok(bid)
    }

    #[tracing::instrument(skip(self))]
    async fn driver_commitments(&self, driver_id: Uuid) -> Result<Vec<Commitment>, Error> {
        let query = "
            SELECT
                b.data AS bid,
                j.data AS job
            FROM
                bids b
                JOIN jobs j ON j.id = b.job_id
            WHERE
                b.driver_id = $1
                AND b.status IN ('pending', 'accepted', 'confirmed')
                AND j.deleted_at IS NULL
        ";

        let mut conn = self.pool.acquire().await?;
        let rows = conn.fetch_all(sqlx::query(query).bind(&driver_id)).await?;

        let mut commitments = vec![];
        for row in rows.iter() {
            let Json(bid): Json<Bid> = row.try_get("bid")?;
            let Json(job): Json<Job> = row.try_get("job")?;
            commitments.push(Commitment { bid, job });
        }

        Ok(commitments)
    }

    #[tracing::instrument(skip(self))]
    async fn lapsed_bids(&self, now: DateTime<Utc>) -> Result<Vec<Bid>, Error> {
        let mut conn = self.pool.acquire().await?;

        let rows = conn
            .fetch_all(
                sqlx::query(
                    "SELECT data FROM bids WHERE status = 'accepted' AND expires_at <= $1 ORDER BY expires_at",
                )
                .bind(now),
            )
            .await?;

        let mut bids = vec![];
        for row in rows.iter() {
            let Json(bid): Json<Bid> = row.try_get("data")?;
            bids.push(bid);
        }

        Ok(bids)
    }

    #[tracing::instrument(skip(self, f))]
    async fn with_ledger<T, F>(&self, job_id: Uuid, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut JobLedger) -> Result<T, Error> + Send,
        T: Send,
    {
        let mut tx = self.pool.begin().await?;

        let job = fetch_job_for_update(&mut tx, &job_id).await?;
        let bids = fetch_bids_for_update(&mut tx, &job_id).await?;
        let mut ledger = JobLedger::new(job, bids);

        let result = match f(&mut ledger) {
            Ok(result) => result,
            Err(err) => {
                tx.rollback().await?;
                return Err(err);
            }
        };

        update_job(&mut tx, &ledger.job).await?;
        for bid in ledger.bids.iter() {
            upsert_bid(&mut tx, bid).await?;
        }

        tx.commit().await.map_err(constraint_error)?;

        Ok(result)
    }

    #[tracing::instrument(skip(self, f))]
    async fn with_driver<T, F>(&self, driver_id: Uuid, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Driver) -> Result<T, Error> + Send,
        T: Send,
    {
        let mut tx = self.pool.begin().await?;

        let mut driver = fetch_driver_for_update(&mut tx, &driver_id).await?;

        let result = match f(&mut driver) {
            Ok(result) => result,
            Err(err) => {
                tx.rollback().await?;
                return Err(err);
            }
        };

        update_driver(&mut tx, &driver).await?;
        tx.commit().await?;

        Ok(result)
    }
}
