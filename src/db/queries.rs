//! SQL query constants
//!
//! Contains all SQL issued against the warehouse. Caller-supplied values are
//! always bind parameters; nothing here is assembled with `format!`.

/// Aggregate load outcomes for control rows modified today
pub const LOAD_SUMMARY: &str = r#"
    SELECT
        COUNT(*)::BIGINT AS total_pipelines,
        COALESCE(SUM(CASE WHEN last_load_status = 'Success' THEN 1 ELSE 0 END), 0)::BIGINT AS successful,
        COALESCE(SUM(records_processed), 0)::BIGINT AS total_records,
        COALESCE(AVG(EXTRACT(EPOCH FROM (modified_date - created_date)) / 60.0), 0)::DOUBLE PRECISION AS avg_duration
    FROM etl.etl_control
    WHERE modified_date::date = CURRENT_DATE
"#;

/// Most recently modified control rows; `$1` is the row limit
pub const RECENT_LOADS: &str = r#"
    SELECT
        table_name,
        last_load_date,
        last_load_status,
        COALESCE(records_processed, 0)::BIGINT AS records_processed,
        modified_date
    FROM etl.etl_control
    ORDER BY modified_date DESC NULLS LAST
    LIMIT $1
"#;

/// Pass/fail counts for checks run during the last day
pub const QUALITY_COUNTS: &str = r#"
    SELECT
        COUNT(*)::BIGINT AS total_checks,
        COALESCE(SUM(CASE WHEN status = 'PASS' THEN 1 ELSE 0 END), 0)::BIGINT AS passed_checks
    FROM etl.data_quality_checks
    WHERE check_date >= NOW() - INTERVAL '1 day'
"#;

/// `$1` schema, `$2` table
pub const TABLE_EXISTS: &str = r#"
    SELECT COUNT(*)::BIGINT
    FROM information_schema.tables
    WHERE table_schema = $1::TEXT
        AND table_name = $2::TEXT
"#;

/// `$1` schema, `$2` routine
pub const ROUTINE_EXISTS: &str = r#"
    SELECT COUNT(*)::BIGINT
    FROM information_schema.routines
    WHERE routine_schema = $1::TEXT
        AND routine_name = $2::TEXT
"#;

/// Customer dimension rows missing their key or name
pub const NULL_CUSTOMER_KEYS: &str = r#"
    SELECT COUNT(*)::BIGINT
    FROM dwh.dim_customer
    WHERE customer_id IS NULL OR customer_name IS NULL
"#;

/// Customer keys with more than one current version
pub const DUPLICATE_CURRENT_CUSTOMERS: &str = r#"
    SELECT COUNT(*)::BIGINT
    FROM (
        SELECT customer_id
        FROM dwh.dim_customer
        WHERE is_current
        GROUP BY customer_id
        HAVING COUNT(*) > 1
    ) AS duplicates
"#;

/// Readiness probe
pub const PING: &str = "SELECT 1";
