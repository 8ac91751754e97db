//! Ledger schema: accounts, journal, periods and the correction audit.
//!
//! The database enforces what it can on its own: balanced entry totals,
//! one-sided non-negative lines, zero balances on header accounts, one
//! balance-affecting entry per business event, and immutability of
//! posted journal rows.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ENUMS
        // ============================================================
        db.execute_unprepared(ENUMS_SQL).await?;

        // ============================================================
        // PART 2: CHART OF ACCOUNTS
        // ============================================================
        db.execute_unprepared(ACCOUNTS_SQL).await?;

        // ============================================================
        // PART 3: JOURNAL
        // ============================================================
        db.execute_unprepared(JOURNAL_ENTRIES_SQL).await?;
        db.execute_unprepared(JOURNAL_LINES_SQL).await?;

        // ============================================================
        // PART 4: PERIODS & AUDIT
        // ============================================================
        db.execute_unprepared(ACCOUNTING_PERIODS_SQL).await?;
        db.execute_unprepared(BALANCE_CORRECTIONS_SQL).await?;

        // ============================================================
        // PART 5: TRIGGERS
        // ============================================================
        db.execute_unprepared(TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

const ENUMS_SQL: &str = r"
CREATE TYPE account_type AS ENUM ('ASSET', 'LIABILITY', 'EQUITY', 'REVENUE', 'EXPENSE');

CREATE TYPE reference_type AS ENUM (
    'SALE', 'PURCHASE', 'PAYMENT', 'CLOSING', 'ADJUSTMENT', 'REVERSAL'
);

CREATE TYPE entry_status AS ENUM ('DRAFT', 'POSTED', 'VOIDED', 'REVERSED');
";

const ACCOUNTS_SQL: &str = r"
CREATE TABLE accounts (
    code            VARCHAR(20) PRIMARY KEY,
    name            VARCHAR(255) NOT NULL,
    account_type    account_type NOT NULL,
    parent_code     VARCHAR(20) REFERENCES accounts(code),
    is_header       BOOLEAN NOT NULL DEFAULT false,
    is_active       BOOLEAN NOT NULL DEFAULT true,
    balance         NUMERIC(20, 2) NOT NULL DEFAULT 0,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT chk_header_balance_zero CHECK (NOT is_header OR balance = 0),
    CONSTRAINT chk_not_own_parent CHECK (parent_code IS NULL OR parent_code <> code)
);

CREATE INDEX idx_accounts_parent ON accounts(parent_code);
CREATE INDEX idx_accounts_type ON accounts(account_type) WHERE NOT is_header;
";

const JOURNAL_ENTRIES_SQL: &str = r"
CREATE TABLE journal_entries (
    id                      UUID PRIMARY KEY,
    entry_date              DATE NOT NULL,
    description             TEXT NOT NULL,
    reference               VARCHAR(100),
    reference_type          reference_type NOT NULL,
    source_id               VARCHAR(100),
    status                  entry_status NOT NULL DEFAULT 'DRAFT',
    total_debit             NUMERIC(20, 2) NOT NULL,
    total_credit            NUMERIC(20, 2) NOT NULL,
    reverses_entry_id       UUID REFERENCES journal_entries(id),
    reversed_by_entry_id    UUID REFERENCES journal_entries(id),
    posted_at               TIMESTAMPTZ,
    created_at              TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT chk_entry_balanced CHECK (total_debit = total_credit),
    CONSTRAINT chk_entry_positive CHECK (total_debit > 0),
    CONSTRAINT chk_posted_at CHECK (
        status NOT IN ('POSTED', 'REVERSED') OR posted_at IS NOT NULL
    )
);

-- One balance-affecting entry per business event.
CREATE UNIQUE INDEX uq_journal_entries_source
    ON journal_entries(reference_type, source_id)
    WHERE source_id IS NOT NULL AND status IN ('POSTED', 'REVERSED');

CREATE INDEX idx_journal_entries_date ON journal_entries(entry_date);
CREATE INDEX idx_journal_entries_status ON journal_entries(status);
";

const JOURNAL_LINES_SQL: &str = r"
CREATE TABLE journal_lines (
    journal_entry_id    UUID NOT NULL REFERENCES journal_entries(id),
    line_number         INTEGER NOT NULL,
    account_code        VARCHAR(20) NOT NULL REFERENCES accounts(code),
    debit_amount        NUMERIC(20, 2) NOT NULL DEFAULT 0,
    credit_amount       NUMERIC(20, 2) NOT NULL DEFAULT 0,
    description         TEXT,

    PRIMARY KEY (journal_entry_id, line_number),
    CONSTRAINT chk_line_number CHECK (line_number > 0),
    CONSTRAINT chk_line_one_side CHECK (
        (debit_amount > 0 AND credit_amount = 0) OR
        (credit_amount > 0 AND debit_amount = 0)
    )
);

CREATE INDEX idx_journal_lines_account ON journal_lines(account_code);
";

const ACCOUNTING_PERIODS_SQL: &str = r"
CREATE TABLE accounting_periods (
    id                  UUID PRIMARY KEY,
    start_date          DATE NOT NULL,
    end_date            DATE NOT NULL,
    description         TEXT NOT NULL DEFAULT '',
    is_closed           BOOLEAN NOT NULL DEFAULT false,
    closing_journal_id  UUID REFERENCES journal_entries(id),
    total_revenue       NUMERIC(20, 2) NOT NULL DEFAULT 0,
    total_expense       NUMERIC(20, 2) NOT NULL DEFAULT 0,
    net_income          NUMERIC(20, 2) NOT NULL DEFAULT 0,
    closed_at           TIMESTAMPTZ,
    reopened_at         TIMESTAMPTZ,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT chk_period_range CHECK (start_date <= end_date),
    CONSTRAINT chk_closed_has_journal CHECK (NOT is_closed OR closing_journal_id IS NOT NULL)
);

CREATE INDEX idx_accounting_periods_range ON accounting_periods(start_date, end_date);
";

const BALANCE_CORRECTIONS_SQL: &str = r"
CREATE TABLE balance_corrections (
    id                  UUID PRIMARY KEY,
    account_code        VARCHAR(20) NOT NULL REFERENCES accounts(code),
    recorded_balance    NUMERIC(20, 2) NOT NULL,
    derived_balance     NUMERIC(20, 2) NOT NULL,
    difference          NUMERIC(20, 2) NOT NULL,
    reason              TEXT NOT NULL,
    corrected_at        TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT chk_correction_reason CHECK (length(trim(reason)) > 0),
    CONSTRAINT chk_correction_difference CHECK (difference = derived_balance - recorded_balance)
);
";

const TRIGGERS_SQL: &str = r"
-- ============================================================
-- FUNCTION: guard_journal_entry
-- Posted history is append-only. The only update allowed on a
-- balance-affecting entry is POSTED -> REVERSED.
-- ============================================================
CREATE OR REPLACE FUNCTION guard_journal_entry()
RETURNS TRIGGER AS $$
BEGIN
    IF TG_OP = 'DELETE' THEN
        IF OLD.status <> 'DRAFT' THEN
            RAISE EXCEPTION 'Cannot delete journal entry % in status %', OLD.id, OLD.status;
        END IF;
        RETURN OLD;
    END IF;

    IF OLD.status IN ('POSTED', 'REVERSED', 'VOIDED') THEN
        IF NOT (OLD.status = 'POSTED' AND NEW.status = 'REVERSED')
           OR NEW.entry_date <> OLD.entry_date
           OR NEW.total_debit <> OLD.total_debit
           OR NEW.total_credit <> OLD.total_credit
           OR NEW.reference_type <> OLD.reference_type THEN
            RAISE EXCEPTION 'Journal entry % is immutable. Create a reversing entry instead.', OLD.id;
        END IF;
    END IF;

    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_guard_journal_entry
BEFORE UPDATE OR DELETE ON journal_entries
FOR EACH ROW
EXECUTE FUNCTION guard_journal_entry();

-- ============================================================
-- FUNCTION: guard_journal_line
-- Lines of a non-draft entry can never change.
-- ============================================================
CREATE OR REPLACE FUNCTION guard_journal_line()
RETURNS TRIGGER AS $$
DECLARE
    parent_status entry_status;
BEGIN
    SELECT status INTO parent_status
    FROM journal_entries
    WHERE id = OLD.journal_entry_id;

    IF parent_status <> 'DRAFT' THEN
        RAISE EXCEPTION 'Lines of journal entry % are immutable', OLD.journal_entry_id;
    END IF;

    IF TG_OP = 'DELETE' THEN
        RETURN OLD;
    END IF;
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_guard_journal_line
BEFORE UPDATE OR DELETE ON journal_lines
FOR EACH ROW
EXECUTE FUNCTION guard_journal_line();

-- ============================================================
-- FUNCTION: guard_account_delete
-- Accounts with journal history stay; deactivate them instead.
-- ============================================================
CREATE OR REPLACE FUNCTION guard_account_delete()
RETURNS TRIGGER AS $$
BEGIN
    IF EXISTS (SELECT 1 FROM journal_lines WHERE account_code = OLD.code) THEN
        RAISE EXCEPTION 'Account % has journal lines and cannot be deleted', OLD.code;
    END IF;
    RETURN OLD;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_guard_account_delete
BEFORE DELETE ON accounts
FOR EACH ROW
EXECUTE FUNCTION guard_account_delete();

-- ============================================================
-- FUNCTION: touch_updated_at
-- ============================================================
CREATE OR REPLACE FUNCTION touch_updated_at()
RETURNS TRIGGER AS $$
BEGIN
    NEW.updated_at := NOW();
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_accounts_updated_at
BEFORE UPDATE ON accounts
FOR EACH ROW
EXECUTE FUNCTION touch_updated_at();
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS balance_corrections;
DROP TABLE IF EXISTS accounting_periods;
DROP TABLE IF EXISTS journal_lines;
DROP TABLE IF EXISTS journal_entries;
DROP TABLE IF EXISTS accounts;
DROP FUNCTION IF EXISTS guard_journal_entry();
DROP FUNCTION IF EXISTS guard_journal_line();
DROP FUNCTION IF EXISTS guard_account_delete();
DROP FUNCTION IF EXISTS touch_updated_at();
DROP TYPE IF EXISTS entry_status;
DROP TYPE IF EXISTS reference_type;
DROP TYPE IF EXISTS account_type;
";
