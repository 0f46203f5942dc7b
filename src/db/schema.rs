use rusqlite::Connection;

/// Initialize the main database schema (users, intents, transactions)
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Users (account state mutated by the crediting service)
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
            plan TEXT NOT NULL DEFAULT 'free' CHECK (plan IN ('free', 'pro')),
            credits INTEGER NOT NULL DEFAULT 0,
            plan_started_at INTEGER,
            next_billing_date INTEGER,
            last_payment_intent_id TEXT,
            api_token_hash TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
        CREATE INDEX IF NOT EXISTS idx_users_token ON users(api_token_hash);

        -- Payment intents (one per purchase attempt, short-lived)
        -- transfer_code is the correlation key embedded in the bank
        -- transfer description; UNIQUE backs the generator's retry loop.
        CREATE TABLE IF NOT EXISTS payment_intents (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            plan TEXT NOT NULL CHECK (plan IN ('pro_monthly', 'pro_yearly', 'credits_50', 'credits_100')),
            amount INTEGER NOT NULL,
            currency TEXT NOT NULL DEFAULT 'VND',
            transfer_code TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'paid', 'expired', 'failed', 'underpaid', 'overpaid', 'cancelled')),
            qr_payload TEXT NOT NULL,
            transaction_id TEXT,
            metadata TEXT,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            paid_at INTEGER,
            cancelled_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_intents_user_status ON payment_intents(user_id, status);
        CREATE INDEX IF NOT EXISTS idx_intents_code ON payment_intents(transfer_code);
        CREATE INDEX IF NOT EXISTS idx_intents_expiry ON payment_intents(status, expires_at);

        -- Transaction ledger (one row per observed bank transaction)
        -- UNIQUE(provider_tx_id) is the idempotency guarantee; inserts use
        -- INSERT OR IGNORE and treat 0 affected rows as a duplicate.
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            provider_tx_id TEXT NOT NULL UNIQUE,
            intent_id TEXT REFERENCES payment_intents(id),
            user_id TEXT REFERENCES users(id),
            amount INTEGER NOT NULL,
            currency TEXT NOT NULL DEFAULT 'VND',
            transfer_code TEXT,
            description TEXT NOT NULL,
            status TEXT NOT NULL
                CHECK (status IN ('matched', 'unmatched', 'amount_mismatch', 'manual_review', 'refunded')),
            provider TEXT NOT NULL,
            raw_payload TEXT NOT NULL,
            bank_code TEXT,
            sender_name TEXT,
            sender_account TEXT,
            metadata TEXT,
            received_at INTEGER NOT NULL,
            processed_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_transactions_status_time ON transactions(status, received_at DESC);
        CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id);
        CREATE INDEX IF NOT EXISTS idx_transactions_intent ON transactions(intent_id);
        "#,
    )?;
    Ok(())
}

/// Initialize the audit database schema (separate DB file)
/// Optimized for append-only workload with WAL mode
pub fn init_audit_db(conn: &Connection) -> rusqlite::Result<()> {
    // WAL mode: writes are sequential appends, much faster for append-only workloads
    // synchronous=NORMAL: safe with WAL, faster than FULL
    // journal_size_limit: prevent WAL from growing indefinitely
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 1000;
        PRAGMA journal_size_limit = 67108864;

        -- One row per webhook HTTP delivery, never deduplicated
        CREATE TABLE IF NOT EXISTS webhook_attempts (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            headers TEXT NOT NULL,
            body TEXT NOT NULL,
            signature_status TEXT NOT NULL CHECK (signature_status IN ('verified', 'invalid', 'skipped')),
            processing_status TEXT NOT NULL DEFAULT 'pending'
                CHECK (processing_status IN ('pending', 'processed', 'unmatched', 'failed')),
            results TEXT,
            error TEXT,
            response_time_ms INTEGER,
            received_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_attempts_time ON webhook_attempts(received_at DESC);
        CREATE INDEX IF NOT EXISTS idx_webhook_attempts_provider ON webhook_attempts(provider, received_at DESC);

        CREATE TABLE IF NOT EXISTS audit_events (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            user_id TEXT,
            action TEXT NOT NULL,
            metadata TEXT,
            ip_address TEXT,
            user_agent TEXT,
            status TEXT NOT NULL DEFAULT 'success'
        );
        CREATE INDEX IF NOT EXISTS idx_audit_events_timestamp ON audit_events(timestamp);
        CREATE INDEX IF NOT EXISTS idx_audit_events_user ON audit_events(user_id);
        CREATE INDEX IF NOT EXISTS idx_audit_events_action ON audit_events(action);
        "#,
    )?;
    Ok(())
}
