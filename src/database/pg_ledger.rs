//! Postgres ledger runtime
//!
//! Each atomic group runs inside one SQL transaction. Any rejected step
//! returns before `commit`, and dropping the transaction rolls back every
//! row the group touched.
//!
//! Transactions run at READ COMMITTED, so a group first locks its contract
//! instance row, and a registration locks the holder's account row before
//! counting its holdings. Groups against one instance therefore apply one at
//! a time, and the holding limit holds across instances.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::health_check;
use crate::database::transaction::DatabaseTransaction;
use crate::issuance::ContractState;
use crate::ledger::receipt::step_tx_id;
use crate::ledger::{
    AccountIdentity, AtomicGroup, Deployment, GroupReceipt, GroupStep, InstanceId, LedgerError,
    LedgerParams, LedgerResult, LedgerRuntime, StepReceipt, TokenId, UnitParams, UnitRecord,
};

#[derive(Debug, Clone, FromRow)]
struct UnitRow {
    token_id: i64,
    creator: String,
    total_supply: i64,
    decimals: i32,
    manager: String,
    freeze: String,
    clawback: String,
    url: String,
    name: String,
    unit_name: String,
}

impl UnitRow {
    fn into_record(self) -> LedgerResult<UnitRecord> {
        Ok(UnitRecord {
            token_id: TokenId::new(from_db(self.token_id, "token_id")?),
            creator: AccountIdentity::new(self.creator)?,
            total_supply: from_db(self.total_supply, "total_supply")?,
            decimals: u32::try_from(self.decimals)
                .map_err(|_| DatabaseError::invalid_value("decimals", "negative"))?,
            manager: AccountIdentity::new(self.manager)?,
            freeze: AccountIdentity::new(self.freeze)?,
            clawback: AccountIdentity::new(self.clawback)?,
            url: self.url,
            name: self.name,
            unit_name: self.unit_name,
        })
    }
}

pub struct PgLedger {
    pool: PgPool,
    params: LedgerParams,
}

impl PgLedger {
    pub fn new(pool: PgPool, params: LedgerParams) -> Self {
        Self { pool, params }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    /// Credit `amount` to `account`, returning the new balance.
    pub async fn fund(&self, account: &AccountIdentity, amount: u64) -> LedgerResult<u64> {
        let balance: i64 = sqlx::query_scalar(
            "INSERT INTO ledger_accounts (address, balance) VALUES ($1, $2)
             ON CONFLICT (address) DO UPDATE SET balance = ledger_accounts.balance + EXCLUDED.balance
             RETURNING balance",
        )
        .bind(account.as_str())
        .bind(to_db(amount, "amount")?)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;

        debug!("Funded {} with {} (balance {})", account, amount, balance);
        from_db(balance, "balance")
    }

    pub async fn balance(&self, account: &AccountIdentity) -> LedgerResult<u64> {
        let mut conn = self.pool.acquire().await.map_err(storage)?;
        balance_of(&mut conn, account).await
    }

    async fn apply(
        &self,
        conn: &mut PgConnection,
        group: &AtomicGroup,
        group_id: &Uuid,
    ) -> LedgerResult<Vec<StepReceipt>> {
        if group.is_empty() {
            return Err(LedgerError::EmptyGroup);
        }

        if let Some(instance) = group.instance() {
            lock_instance(conn, instance).await?;
        }

        let sender = group.sender();
        ensure_account(conn, sender).await?;

        let mut created: Vec<TokenId> = Vec::new();
        let mut receipts = Vec::with_capacity(group.len());

        for (index, step) in group.steps().iter().enumerate() {
            charge_fee(conn, sender, self.params.step_fee).await?;
            let tx_id = step_tx_id(group_id, index, step.kind());

            match step {
                GroupStep::CreateUnit(unit) => {
                    self.params.validate_unit(unit)?;
                    let token_id = insert_unit(conn, sender, unit).await?;
                    created.push(token_id);
                    receipts.push(StepReceipt::Created { tx_id, token_id });
                }
                GroupStep::RegisterHolder {
                    token,
                    holder,
                    quantity,
                } => {
                    let token_id = token.resolve(&created)?;
                    ensure_unit(conn, token_id).await?;
                    if *quantity != 0 {
                        return Err(LedgerError::invalid_parameter(
                            "quantity",
                            "registration must transfer zero units",
                        ));
                    }
                    ensure_account(conn, holder).await?;
                    lock_account(conn, holder).await?;

                    if held(conn, holder, token_id).await?.is_none() {
                        let registered: i64 = sqlx::query_scalar(
                            "SELECT COUNT(*) FROM ledger_holdings WHERE holder = $1",
                        )
                        .bind(holder.as_str())
                        .fetch_one(&mut *conn)
                        .await
                        .map_err(storage)?;

                        let limit = self.params.max_holdings_per_account;
                        if usize::try_from(registered).unwrap_or(usize::MAX) >= limit {
                            return Err(LedgerError::holding_limit_reached(holder, limit));
                        }

                        sqlx::query(
                            "INSERT INTO ledger_holdings (token_id, holder, amount) VALUES ($1, $2, 0)",
                        )
                        .bind(to_db(token_id.value(), "token_id")?)
                        .bind(holder.as_str())
                        .execute(&mut *conn)
                        .await
                        .map_err(storage)?;
                    }

                    receipts.push(StepReceipt::Registered {
                        tx_id,
                        token_id,
                        holder: holder.clone(),
                    });
                }
                GroupStep::TransferUnit {
                    token,
                    recipient,
                    quantity,
                } => {
                    let token_id = token.resolve(&created)?;
                    ensure_unit(conn, token_id).await?;
                    transfer(conn, token_id, sender, recipient, *quantity).await?;

                    receipts.push(StepReceipt::Transferred {
                        tx_id,
                        token_id,
                        from: sender.clone(),
                        to: recipient.clone(),
                        quantity: *quantity,
                    });
                }
            }
        }

        if let Some(write) = group.state_write() {
            let token_id = write.last_token_id.resolve(&created)?;
            let updated = sqlx::query(
                "UPDATE contract_instances SET last_token_id = $1 WHERE instance_id = $2",
            )
            .bind(to_db(token_id.value(), "token_id")?)
            .bind(to_db(write.instance.value(), "instance_id")?)
            .execute(&mut *conn)
            .await
            .map_err(storage)?;

            if updated.rows_affected() == 0 {
                return Err(LedgerError::unknown_instance(write.instance.value()));
            }
        }

        Ok(receipts)
    }
}

#[async_trait]
impl LedgerRuntime for PgLedger {
    async fn deploy(&self, creator: &AccountIdentity) -> LedgerResult<Deployment> {
        let mut tx = DatabaseTransaction::begin(&self.pool).await?;

        let instance_id: i64 = sqlx::query_scalar(
            "INSERT INTO contract_instances (admin) VALUES ($1) RETURNING instance_id",
        )
        .bind(creator.as_str())
        .fetch_one(&mut *tx.conn()?)
        .await
        .map_err(storage)?;

        let instance = InstanceId::new(from_db(instance_id, "instance_id")?);
        let app_account = AccountIdentity::application(instance);
        ensure_account(tx.conn()?, &app_account).await?;

        tx.commit().await?;

        info!(
            "Deployed contract instance {} for admin {} (application account {})",
            instance, creator, app_account
        );

        Ok(Deployment {
            instance,
            app_account,
            state: ContractState::new(creator.clone()),
        })
    }

    async fn load_state(&self, instance: InstanceId) -> LedgerResult<ContractState> {
        let row: Option<(String, Option<i64>)> = sqlx::query_as(
            "SELECT admin, last_token_id FROM contract_instances WHERE instance_id = $1",
        )
        .bind(to_db(instance.value(), "instance_id")?)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        let (admin, last_token_id) =
            row.ok_or_else(|| LedgerError::unknown_instance(instance.value()))?;
        let last_token_id = last_token_id
            .map(|id| from_db(id, "last_token_id").map(TokenId::new))
            .transpose()?;

        Ok(ContractState::restore(
            AccountIdentity::new(admin)?,
            last_token_id,
        ))
    }

    async fn submit_group(&self, group: AtomicGroup) -> LedgerResult<GroupReceipt> {
        let group_id = Uuid::new_v4();
        let mut tx = DatabaseTransaction::begin(&self.pool).await?;

        debug!(
            "Applying atomic group {} with {} steps from {}",
            group_id,
            group.len(),
            group.sender()
        );

        let applied = self.apply(tx.conn()?, &group, &group_id).await;
        let steps = match applied {
            Ok(steps) => steps,
            Err(e) => {
                warn!("Atomic group {} rejected, rolling back: {}", group_id, e);
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback of group {} failed: {}", group_id, rollback_err);
                }
                return Err(e);
            }
        };

        let committed_at = Utc::now();
        sqlx::query(
            "INSERT INTO ledger_groups (group_id, sender, step_count, committed_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(group_id)
        .bind(group.sender().as_str())
        .bind(i32::try_from(steps.len()).unwrap_or(i32::MAX))
        .bind(committed_at)
        .execute(&mut *tx.conn()?)
        .await
        .map_err(storage)?;

        tx.commit().await?;
        info!("Committed atomic group {} ({} steps)", group_id, steps.len());

        Ok(GroupReceipt {
            group_id,
            steps,
            committed_at,
        })
    }

    async fn unit(&self, token: TokenId) -> LedgerResult<Option<UnitRecord>> {
        let row: Option<UnitRow> = sqlx::query_as(
            "SELECT token_id, creator, total_supply, decimals, manager, freeze, clawback, url, name, unit_name
             FROM ledger_units WHERE token_id = $1",
        )
        .bind(to_db(token.value(), "token_id")?)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.map(UnitRow::into_record).transpose()
    }

    async fn holding(
        &self,
        account: &AccountIdentity,
        token: TokenId,
    ) -> LedgerResult<Option<u64>> {
        let mut conn = self.pool.acquire().await.map_err(storage)?;
        held(&mut conn, account, token).await
    }

    async fn holders(&self, token: TokenId) -> LedgerResult<Vec<(AccountIdentity, u64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT holder, amount FROM ledger_holdings
             WHERE token_id = $1 AND amount > 0 ORDER BY holder",
        )
        .bind(to_db(token.value(), "token_id")?)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.into_iter()
            .map(|(holder, amount)| Ok((AccountIdentity::new(holder)?, from_db(amount, "amount")?)))
            .collect()
    }

    async fn ping(&self) -> LedgerResult<()> {
        health_check(&self.pool).await?;
        Ok(())
    }
}

fn storage(e: sqlx::Error) -> LedgerError {
    DatabaseError::from_sqlx(e).into()
}

fn to_db(value: u64, column: &str) -> LedgerResult<i64> {
    i64::try_from(value)
        .map_err(|_| DatabaseError::invalid_value(column, format!("{} exceeds BIGINT", value)).into())
}

fn from_db(value: i64, column: &str) -> LedgerResult<u64> {
    u64::try_from(value)
        .map_err(|_| DatabaseError::invalid_value(column, format!("{} is negative", value)).into())
}

async fn ensure_account(conn: &mut PgConnection, account: &AccountIdentity) -> LedgerResult<()> {
    sqlx::query("INSERT INTO ledger_accounts (address) VALUES ($1) ON CONFLICT (address) DO NOTHING")
        .bind(account.as_str())
        .execute(&mut *conn)
        .await
        .map_err(storage)?;
    Ok(())
}

/// Hold the instance row until commit; concurrent groups for it wait here.
async fn lock_instance(conn: &mut PgConnection, instance: InstanceId) -> LedgerResult<()> {
    let locked: Option<i64> = sqlx::query_scalar(
        "SELECT instance_id FROM contract_instances WHERE instance_id = $1 FOR UPDATE",
    )
    .bind(to_db(instance.value(), "instance_id")?)
    .fetch_optional(&mut *conn)
    .await
    .map_err(storage)?;

    match locked {
        Some(_) => Ok(()),
        None => Err(LedgerError::unknown_instance(instance.value())),
    }
}

async fn lock_account(conn: &mut PgConnection, account: &AccountIdentity) -> LedgerResult<()> {
    sqlx::query("SELECT address FROM ledger_accounts WHERE address = $1 FOR UPDATE")
        .bind(account.as_str())
        .fetch_one(&mut *conn)
        .await
        .map_err(storage)?;
    Ok(())
}

async fn balance_of(conn: &mut PgConnection, account: &AccountIdentity) -> LedgerResult<u64> {
    let balance: Option<i64> =
        sqlx::query_scalar("SELECT balance FROM ledger_accounts WHERE address = $1")
            .bind(account.as_str())
            .fetch_optional(&mut *conn)
            .await
            .map_err(storage)?;
    from_db(balance.unwrap_or(0), "balance")
}

async fn charge_fee(conn: &mut PgConnection, account: &AccountIdentity, fee: u64) -> LedgerResult<()> {
    if fee == 0 {
        return Ok(());
    }

    let charged = sqlx::query(
        "UPDATE ledger_accounts SET balance = balance - $1 WHERE address = $2 AND balance >= $1",
    )
    .bind(to_db(fee, "fee")?)
    .bind(account.as_str())
    .execute(&mut *conn)
    .await
    .map_err(storage)?;

    if charged.rows_affected() == 0 {
        let available = balance_of(conn, account).await?;
        return Err(LedgerError::insufficient_fee(account, available, fee));
    }
    Ok(())
}

async fn ensure_unit(conn: &mut PgConnection, token: TokenId) -> LedgerResult<()> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM ledger_units WHERE token_id = $1)")
            .bind(to_db(token.value(), "token_id")?)
            .fetch_one(&mut *conn)
            .await
            .map_err(storage)?;

    if exists {
        Ok(())
    } else {
        Err(LedgerError::unknown_unit(token.value()))
    }
}

async fn held(
    conn: &mut PgConnection,
    account: &AccountIdentity,
    token: TokenId,
) -> LedgerResult<Option<u64>> {
    let amount: Option<i64> = sqlx::query_scalar(
        "SELECT amount FROM ledger_holdings WHERE token_id = $1 AND holder = $2",
    )
    .bind(to_db(token.value(), "token_id")?)
    .bind(account.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(storage)?;

    amount.map(|a| from_db(a, "amount")).transpose()
}

async fn insert_unit(
    conn: &mut PgConnection,
    creator: &AccountIdentity,
    unit: &UnitParams,
) -> LedgerResult<TokenId> {
    let token_id: i64 = sqlx::query_scalar(
        "INSERT INTO ledger_units
             (creator, total_supply, decimals, manager, freeze, clawback, url, name, unit_name)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING token_id",
    )
    .bind(creator.as_str())
    .bind(to_db(unit.total_supply, "total_supply")?)
    .bind(i32::try_from(unit.decimals).map_err(|_| {
        LedgerError::invalid_parameter("decimals", "does not fit the ledger column")
    })?)
    .bind(unit.manager.as_str())
    .bind(unit.freeze.as_str())
    .bind(unit.clawback.as_str())
    .bind(&unit.url)
    .bind(&unit.name)
    .bind(&unit.unit_name)
    .fetch_one(&mut *conn)
    .await
    .map_err(storage)?;

    sqlx::query("INSERT INTO ledger_holdings (token_id, holder, amount) VALUES ($1, $2, $3)")
        .bind(token_id)
        .bind(creator.as_str())
        .bind(to_db(unit.total_supply, "total_supply")?)
        .execute(&mut *conn)
        .await
        .map_err(storage)?;

    Ok(TokenId::new(from_db(token_id, "token_id")?))
}

async fn transfer(
    conn: &mut PgConnection,
    token: TokenId,
    from: &AccountIdentity,
    to: &AccountIdentity,
    quantity: u64,
) -> LedgerResult<()> {
    if held(conn, to, token).await?.is_none() {
        return Err(LedgerError::not_registered(to, token.value()));
    }

    let token_db = to_db(token.value(), "token_id")?;
    let quantity_db = to_db(quantity, "quantity")?;

    let debited = sqlx::query(
        "UPDATE ledger_holdings SET amount = amount - $1
         WHERE token_id = $2 AND holder = $3 AND amount >= $1",
    )
    .bind(quantity_db)
    .bind(token_db)
    .bind(from.as_str())
    .execute(&mut *conn)
    .await
    .map_err(storage)?;

    if debited.rows_affected() == 0 {
        let available = held(conn, from, token).await?.unwrap_or(0);
        return Err(LedgerError::insufficient_units(
            from,
            token.value(),
            available,
            quantity,
        ));
    }

    sqlx::query(
        "UPDATE ledger_holdings SET amount = amount + $1 WHERE token_id = $2 AND holder = $3",
    )
    .bind(quantity_db)
    .bind(token_db)
    .bind(to.as_str())
    .execute(&mut *conn)
    .await
    .map_err(storage)?;

    Ok(())
}
