//! Reconciliation checks end to end against an in-memory data source.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use recon_core::partner::PartnerTenantMap;
use recon_core::types::{Record, TenantId, Value};
use recon_db::{DataSource, DbError, TenantConnection};
use recon_fanout::WorkError;
use recon_worker::checks::Check;
use recon_worker::{Runner, WorkerConfig};

// ---------------------------------------------------------------------------
// Fake data source
// ---------------------------------------------------------------------------

type Handler = dyn Fn(&str, &str, &[Value]) -> Result<Vec<Record>, DbError> + Send + Sync;

/// Routes every query to `handler(database, sql, params)` and records it.
struct FakeSource {
    handler: Arc<Handler>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeSource {
    fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &str, &[Value]) -> Result<Vec<Record>, DbError> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn calls_to(&self, database: &str, marker: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(db, sql)| db == database && sql.contains(marker))
            .count()
    }
}

struct FakeConn {
    database: String,
    handler: Arc<Handler>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl DataSource for FakeSource {
    async fn open(&self, database: &str) -> Result<Box<dyn TenantConnection>, DbError> {
        Ok(Box::new(FakeConn {
            database: database.to_string(),
            handler: self.handler.clone(),
            calls: self.calls.clone(),
        }))
    }
}

#[async_trait]
impl TenantConnection for FakeConn {
    fn database(&self) -> &str {
        &self.database
    }

    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Record>, DbError> {
        self.calls
            .lock()
            .unwrap()
            .push((self.database.clone(), sql.to_string()));
        (self.handler)(&self.database, sql, params)
    }

    async fn close(self: Box<Self>) -> Result<(), DbError> {
        Ok(())
    }
}

fn unreachable(database: &str) -> DbError {
    DbError::Query {
        database: database.to_string(),
        message: "connection refused".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config(out: &Path, extra: &[(&str, &str)]) -> WorkerConfig {
    let mut vars: HashMap<String, String> = extra
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    vars.insert("OUTPUT_DIR".into(), out.display().to_string());
    WorkerConfig::from_lookup(|var| vars.get(var).cloned()).unwrap()
}

fn tenants(ids: &[&str]) -> Vec<TenantId> {
    ids.iter().map(|id| TenantId::new(*id).unwrap()).collect()
}

fn partners(pairs: &[(&str, &str)]) -> Arc<PartnerTenantMap> {
    Arc::new(
        pairs
            .iter()
            .map(|(pdi, t)| (pdi.to_string(), TenantId::new(*t).unwrap()))
            .collect(),
    )
}

/// Header plus rows of a CSV file.
fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let header = reader.headers().unwrap().iter().map(str::to_string).collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    (header, rows)
}

fn text_params(params: &[Value]) -> Vec<String> {
    params.iter().map(|p| p.to_field().into_owned()).collect()
}

// ---------------------------------------------------------------------------
// Test: arsenal check lists arsenals, tags rows, isolates failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn arsenal_pr_is_dcn_tags_rows_with_tenant() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::new(|db, sql, params| match db {
        "mercury" if sql.contains("FROM arsenal ") => Ok(vec![
            Record::new().with("tenant", "ar1"),
            Record::new().with("tenant", "ar2"),
        ]),
        "ar1" => {
            assert_eq!(text_params(params), ["2025-08-25"]);
            Ok(vec![
                Record::new().with("debit_note_number", "DC-1"),
                Record::new().with("debit_note_number", "DC-2"),
            ])
        }
        other => Err(unreachable(other)),
    }));
    let runner = Runner::new(config(dir.path(), &[]), source.clone()).unwrap();

    let summary = runner.run(Check::ArsenalPrIsDcn).await.unwrap();

    assert_eq!(summary.succeeded, tenants(&["ar1"]));
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].tenant.as_str(), "ar2");
    assert_eq!(source.calls_to("mercury", "FROM warehouse "), 0);

    let (header, rows) = read_csv(&dir.path().join("deliveryChallanNormalInArsenalPRV2.csv"));
    assert_eq!(header, ["debit_note_number", "tenant"]);
    assert_eq!(rows, [["DC-1", "ar1"], ["DC-2", "ar1"]]);
}

// ---------------------------------------------------------------------------
// Test: excluded tenants are never run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn excluded_tenants_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::new(|db, sql, _| match db {
        "mercury" if sql.contains("FROM arsenal ") => Ok(vec![
            Record::new().with("tenant", "ar1"),
            Record::new().with("tenant", "ar2"),
        ]),
        _ => Ok(Vec::new()),
    }));
    let runner = Runner::new(config(dir.path(), &[("EXCLUDE_TENANTS", "ar2")]), source.clone()).unwrap();

    let summary = runner.run(Check::ArsenalPrIsDcn).await.unwrap();

    assert_eq!(summary.succeeded, tenants(&["ar1"]));
    assert_eq!(source.calls_to("ar2", "purchase_issue"), 0);
}

// ---------------------------------------------------------------------------
// Test: an unreachable directory is an error, not an empty run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreachable_directory_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::new(|db, _, _| Err(unreachable(db))));
    let runner = Runner::new(config(dir.path(), &[]), source).unwrap();

    let err = runner.run(Check::ArsenalPrIsDcn).await.unwrap_err();

    assert_matches!(err, WorkError::Directory(_));
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

// ---------------------------------------------------------------------------
// Test: unreadable partner map stops a cross-tenant check before it starts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_partner_map_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.json");
    let source = Arc::new(FakeSource::new(|_, _, _| Ok(Vec::new())));
    let cfg = config(dir.path(), &[("PARTNER_TENANT_MAP", missing.to_str().unwrap())]);
    let runner = Runner::new(cfg, source.clone()).unwrap();

    let err = runner.run(Check::DcCreatedStrNotCreated).await.unwrap_err();

    assert_matches!(err, WorkError::Core(_));
    assert_eq!(source.calls.lock().unwrap().len(), 0);
}

#[tokio::test]
async fn partner_map_is_read_from_configured_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partners.json");
    std::fs::write(&path, r#"{"10": "th2", "11": "ar7"}"#).unwrap();
    let source = Arc::new(FakeSource::new(|_, _, _| Ok(Vec::new())));
    let cfg = config(dir.path(), &[("PARTNER_TENANT_MAP", path.to_str().unwrap())]);
    let runner = Runner::new(cfg, source).unwrap();

    let map = runner.partners_for(Check::UcodeNeverInwarded).unwrap();
    assert_eq!(map.get("11").map(TenantId::as_str), Some("ar7"));
    assert!(runner.partners_for(Check::ArsenalPrIsDcn).unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Test: delivery challans missing at the destination are reported
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dc_without_inward_at_partner_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::new(|db, sql, params| match db {
        "th1" if sql.contains("FROM purchase_issue") => Ok(vec![
            Record::new().with("debit_note_number", "DC1").with("partner_detail_id", 10i64),
            Record::new().with("debit_note_number", "DC2").with("partner_detail_id", 10i64),
            Record::new().with("debit_note_number", "PE9").with("partner_detail_id", 10i64),
        ]),
        "th2" if sql.contains("FROM inward_invoice") => {
            assert!(!text_params(params).contains(&"PE9".to_string()));
            Ok(params
                .iter()
                .filter(|p| p.as_str() == Some("DC1"))
                .map(|p| Record::new().with("invoice_no", p.clone()))
                .collect())
        }
        other => Err(unreachable(other)),
    }));
    let runner = Runner::new(config(dir.path(), &[]), source).unwrap();

    let summary = runner
        .run_for(Check::DcCreatedStrNotCreated, tenants(&["th1"]), partners(&[("10", "th2")]))
        .await
        .unwrap();

    assert!(summary.all_succeeded());
    let (header, rows) = read_csv(&dir.path().join("dcCreatedStrNotCreated.csv"));
    assert_eq!(header, ["source_debit_note_number", "dest_tenant", "source_tenant"]);
    assert_eq!(rows, [["DC2", "th2", "th1"]]);
}

// ---------------------------------------------------------------------------
// Test: a destination lookup failure fails the source tenant
// ---------------------------------------------------------------------------

#[tokio::test]
async fn destination_failure_fails_source_tenant() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::new(|db, _, _| match db {
        "th1" => Ok(vec![Record::new()
            .with("debit_note_number", "DC1")
            .with("partner_detail_id", 10i64)]),
        other => Err(unreachable(other)),
    }));
    let runner = Runner::new(config(dir.path(), &[]), source).unwrap();

    let summary = runner
        .run_for(Check::DcCreatedStrNotCreated, tenants(&["th1"]), partners(&[("10", "th2")]))
        .await
        .unwrap();

    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].error.contains("th2"));
    assert!(!dir.path().join("dcCreatedStrNotCreated.csv").exists());
}

// ---------------------------------------------------------------------------
// Test: partner ids are bound in batches of BATCH_SIZE
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partner_lookups_are_batched() {
    let dir = tempfile::tempdir().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    let source = Arc::new(FakeSource::new(move |_, _, params| {
        recorded.lock().unwrap().push(text_params(params));
        Ok(Vec::new())
    }));
    let runner = Runner::new(config(dir.path(), &[("BATCH_SIZE", "2")]), source).unwrap();
    let map = partners(&[("1", "a"), ("2", "b"), ("3", "c"), ("4", "d"), ("5", "e")]);

    runner
        .run_for(Check::DcCreatedStrNotCreated, tenants(&["th1"]), map)
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        [
            vec!["2025-05-28", "1", "2"],
            vec!["2025-05-28", "3", "4"],
            vec!["2025-05-28", "5"],
        ]
    );
}

// ---------------------------------------------------------------------------
// Test: ucode check writes each DC state to its own file
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ucode_passes_write_separate_files() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::new(|db, sql, params| match db {
        "th1" if sql.contains("debit_note_number IS NULL") => Ok(vec![
            Record::new().with("partner_detail_id", 10i64).with("ucode", "000001"),
            Record::new().with("partner_detail_id", 10i64).with("ucode", "000002"),
        ]),
        "th1" => Ok(vec![Record::new()
            .with("partner_detail_id", 10i64)
            .with("ucode", "000003")]),
        "th2" => Ok(params
            .iter()
            .filter(|p| p.as_str() == Some("000001"))
            .map(|p| Record::new().with("code", p.clone()))
            .collect()),
        other => Err(unreachable(other)),
    }));
    let runner = Runner::new(config(dir.path(), &[]), source).unwrap();

    let summary = runner
        .run_for(Check::UcodeNeverInwarded, tenants(&["th1"]), partners(&[("10", "th2")]))
        .await
        .unwrap();

    assert!(summary.all_succeeded());
    let (header, rows) = read_csv(&dir.path().join("ucodeNeverInwardForDCNotGenerated.csv"));
    assert_eq!(header, ["tenant", "partner_detail_id", "ucode", "dest_tenant"]);
    assert_eq!(rows, [["th1", "10", "000002", "th2"]]);
    let (_, rows) = read_csv(&dir.path().join("ucodeNeverInwardForDCGenerated.csv"));
    assert_eq!(rows, [["th1", "10", "000003", "th2"]]);
}

// ---------------------------------------------------------------------------
// Test: invalid invoice check validates each purchase return
// ---------------------------------------------------------------------------

fn purchase_return(id: i64, pdi: i64, invoice_id: Option<i64>) -> Record {
    Record::new()
        .with("id", id)
        .with("partner_detail_id", pdi)
        .with("tray_id", Value::Null)
        .with("invoice_id", invoice_id)
        .with("invoice_no", format!("INV-{id}"))
        .with("invoice_sequence_type", "A")
        .with("pr_type", "REGULAR")
        .with("invoice_date", "2025-08-02")
        .with("invoice_tenant", "th1")
        .with("status", "created")
        .with("debit_note_number", Value::Null)
        .with("created_on", "2025-08-02 10:00:00")
        .with("updated_on", "2025-08-03 10:00:00")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn invalid_invoices_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::new(|db, sql, params| {
        assert_eq!(db, "th1");
        if sql.contains("FROM purchase_issue") {
            return Ok(vec![
                purchase_return(1, 10, Some(100)),
                purchase_return(2, 10, Some(101)),
                purchase_return(3, 10, None),
                purchase_return(4, 10, Some(102)),
                purchase_return(5, 99, Some(100)),
            ]);
        }
        let invoice = match params[0].as_i64() {
            Some(100) => Some(("ICS", 10i64)),
            Some(101) => Some(("StockTransfer", 11)),
            _ => None,
        };
        Ok(invoice
            .map(|(kind, pdi)| {
                Record::new()
                    .with("purchase_type", kind)
                    .with("partner_detail_id", pdi)
            })
            .into_iter()
            .collect())
    }));
    let runner = Runner::new(config(dir.path(), &[("MAX_WORKERS", "2")]), source.clone()).unwrap();

    let summary = runner
        .run_for(
            Check::InvalidInvoiceInPr,
            tenants(&["th1"]),
            partners(&[("10", "th2")]),
        )
        .await
        .unwrap();

    assert!(summary.all_succeeded());
    assert_eq!(summary.records_written, 2);
    // One lookup per purchase return with a mapped partner and an invoice.
    assert_eq!(source.calls_to("th1", "FROM inward_invoice"), 3);

    let (header, mut rows) = read_csv(&dir.path().join("invalidInvoiceInPR.csv"));
    assert_eq!(
        header,
        [
            "dest_tenant",
            "source_tenant",
            "purchase_issue_id",
            "invoice_id",
            "invoice_no",
            "pr_type",
            "invoice_tenant",
            "is_invoice_tenant_same",
            "status",
            "debit_note_number",
            "created_on",
            "updated_on",
        ]
    );
    rows.sort();
    assert_eq!(rows[0][..5], ["th2", "th1", "2", "101", "INV-2"]);
    assert_eq!(rows[0][7], "true");
    assert_eq!(rows[1][2..4], ["4", "102"]);
}

// ---------------------------------------------------------------------------
// Test: RECON_SINCE overrides each check's own date bound
// ---------------------------------------------------------------------------

#[tokio::test]
async fn since_override_replaces_check_default() {
    let dir = tempfile::tempdir().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    let source = Arc::new(FakeSource::new(move |_, _, params| {
        recorded.lock().unwrap().push(text_params(params));
        Ok(Vec::new())
    }));
    let runner = Runner::new(config(dir.path(), &[("RECON_SINCE", "2024-01-31")]), source).unwrap();

    runner
        .run_for(Check::ArsenalPrIsDcn, tenants(&["ar1"]), partners(&[]))
        .await
        .unwrap();
    runner
        .run_for(Check::PrSales, tenants(&["th1"]), partners(&[]))
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), [["2024-01-31"], ["2024-01-31"]]);
}

// ---------------------------------------------------------------------------
// Test: single-query checks tag rows with the tenant
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_return_inwards_lead_with_tenant() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::new(|db, sql, params| {
        assert!(sql.contains("HAVING COUNT(*) > 1"));
        assert_eq!(text_params(params), ["2025-08-26"]);
        match db {
            "th1" => Ok(vec![Record::new()
                .with("invoice_no", "STR-1")
                .with("statuses", "live, pending")
                .with("created_ons", "2025-09-01, 2025-09-02")
                .with("created_by", "ops")
                .with("total_amount_invoice", "10.00, 10.00")
                .with("total_count", 2i64)]),
            _ => Ok(Vec::new()),
        }
    }));
    let runner = Runner::new(config(dir.path(), &[]), source).unwrap();

    let summary = runner
        .run_for(Check::DuplicateStrInwardInvoice, tenants(&["th1", "th2"]), partners(&[]))
        .await
        .unwrap();

    assert!(summary.all_succeeded());
    let (header, rows) = read_csv(&dir.path().join("duplicateStrInwardInvoice.csv"));
    assert_eq!(
        header,
        ["tenant", "invoice_no", "statuses", "created_ons", "created_by", "total_amount_invoice", "total_count"]
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][..3], ["th1", "STR-1", "live, pending"]);
}

#[tokio::test]
async fn cancelled_invoice_rows_carry_cancel_statement() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::new(|_, _, params| {
        assert_eq!(text_params(params), ["2025-05-27"]);
        Ok(vec![Record::new()
            .with("inward_invoice_id", 5i64)
            .with("invoice_no", "INV-5")
            .with("created_on", "2025-06-01 09:00:00")
            .with("status", "CANCELLED")
            .with("gatepass_status", "OPEN")
            .with("gatepass_invoice_id", 77i64)
            .with("gatepass_id", 3i64)
            .with("inward_invoice_total", "99.50")])
    }));
    let runner = Runner::new(config(dir.path(), &[]), source).unwrap();

    runner
        .run_for(Check::InvoiceCancelledGatepassCreated, tenants(&["th4"]), partners(&[]))
        .await
        .unwrap();

    let (header, rows) = read_csv(&dir.path().join("invoiceCancelledGatepassCreated.csv"));
    assert_eq!(header[header.len() - 2..], ["tenant", "cancelled_query"]);
    let row = &rows[0];
    assert_eq!(row[row.len() - 2], "th4");
    assert_eq!(
        row[row.len() - 1],
        "UPDATE `th4`.gatepass_invoice SET status = 'CANCELLED' WHERE id = '77' AND no = 'INV-5' AND status = 'OPEN';"
    );
}

#[tokio::test]
async fn pr_sales_without_debit_note_are_listed() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::new(|_, sql, params| {
        assert!(sql.contains("pi.debit_note_number IS NULL OR pi.debit_note_number = ''"));
        assert_eq!(text_params(params), ["2025-07-01"]);
        Ok(vec![Record::new()
            .with("purchase_issue_id", 12i64)
            .with("pr_type", "PR_SALES")
            .with("debit_note_number", Value::Null)
            .with("partner_detail_id", 10i64)
            .with("created_on", "2025-07-02 11:00:00")
            .with("status", "created")])
    }));
    let runner = Runner::new(config(dir.path(), &[]), source).unwrap();

    runner
        .run_for(Check::PrSales, tenants(&["ar3"]), partners(&[]))
        .await
        .unwrap();

    let (header, rows) = read_csv(&dir.path().join("prSales.csv"));
    assert_eq!(header[..3], ["tenant", "purchase_issue_id", "pr_type"]);
    assert_eq!(rows, [["ar3", "12", "PR_SALES", "", "10", "2025-07-02 11:00:00", "created"]]);
}

// ---------------------------------------------------------------------------
// Test: credit notes are looked up in the vault batch by batch
// ---------------------------------------------------------------------------

fn return_inwards(n: i64) -> Vec<Record> {
    (1..=n)
        .map(|id| {
            Record::new()
                .with("invoice_id", id)
                .with("invoice_no", format!("STR-{id}"))
                .with("created_on", "2025-06-01")
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_credit_notes_are_found_in_the_vault() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::new(|db, _, params| match db {
        "th1" => {
            assert_eq!(text_params(params), ["2025-05-28"]);
            Ok(return_inwards(5))
        }
        "vault" => {
            let params = text_params(params);
            let (ids, tail) = params.split_at(params.len() - 3);
            assert_eq!(tail, ["ICS_RETURN", "ST_RETURN", "th1"]);
            assert!(ids.len() <= 2);
            Ok(ids
                .iter()
                .filter(|id| *id == "3")
                .map(|id| {
                    Record::new()
                        .with("return_order_id", id.as_str())
                        .with("note_type", "ST_RETURN")
                        .with("partner_detail_id", 10i64)
                        .with("debit_note_numbers", "DN1, DN2")
                        .with("credit_note_numbers", "CN1, CN2")
                })
                .collect())
        }
        other => Err(unreachable(other)),
    }));
    let cfg = config(dir.path(), &[("BATCH_SIZE", "2"), ("MAX_WORKERS", "3")]);
    let runner = Runner::new(cfg, source.clone()).unwrap();

    let summary = runner
        .run_for(Check::MultiCnForStrInward, tenants(&["th1"]), partners(&[]))
        .await
        .unwrap();

    assert!(summary.all_succeeded());
    assert_eq!(source.calls_to("vault", "FROM debitnote"), 3);
    let (header, rows) = read_csv(&dir.path().join("multiCNForStrInward.csv"));
    assert_eq!(
        header,
        ["return_order_id", "note_type", "partner_detail_id", "debit_note_numbers", "credit_note_numbers", "tenant"]
    );
    assert_eq!(rows, [["3", "ST_RETURN", "10", "DN1, DN2", "CN1, CN2", "th1"]]);
}

#[tokio::test]
async fn vault_failure_fails_the_tenant() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::new(|db, _, _| match db {
        "th1" => Ok(return_inwards(3)),
        other => Err(unreachable(other)),
    }));
    let runner = Runner::new(config(dir.path(), &[("BATCH_SIZE", "2")]), source).unwrap();

    let summary = runner
        .run_for(Check::MultiCnForStrInward, tenants(&["th1"]), partners(&[]))
        .await
        .unwrap();

    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].error.contains("vault"));
    assert!(!dir.path().join("multiCNForStrInward.csv").exists());
}

// ---------------------------------------------------------------------------
// Test: inward quantities are compared with the source purchase return
// ---------------------------------------------------------------------------

#[tokio::test]
async fn return_quantity_differences_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let line = |invoice: &str, code: &str, qty: i64| {
        Record::new()
            .with("invoice_no", invoice)
            .with("status", "live")
            .with("partner_detail_id", 10i64)
            .with("code", code)
            .with("batch", "B1")
            .with("total_quantity", qty)
    };
    let lines = vec![line("DN1", "000001", 5), line("DN1", "000002", 3), line("DN2", "000001", 2)];
    let source = Arc::new(FakeSource::new(move |db, _, params| match db {
        "th2" => {
            assert_eq!(text_params(params), ["2025-08-26"]);
            Ok(lines.clone())
        }
        "th1" => {
            assert_eq!(text_params(params), ["DN1", "DN2"]);
            Ok(vec![
                Record::new()
                    .with("debit_note_number", "DN1")
                    .with("ucode", "000001")
                    .with("batch", "B1")
                    .with("total_return_qty", "5.000"),
                Record::new()
                    .with("debit_note_number", "DN1")
                    .with("ucode", "000002")
                    .with("batch", "B1")
                    .with("total_return_qty", "4.000"),
            ])
        }
        other => Err(unreachable(other)),
    }));
    let runner = Runner::new(config(dir.path(), &[]), source).unwrap();

    let summary = runner
        .run_for(Check::StrReturnQuantityDifferent, tenants(&["th2"]), partners(&[("10", "th1")]))
        .await
        .unwrap();

    assert!(summary.all_succeeded());
    let (header, rows) = read_csv(&dir.path().join("strCreatedReturnQunatityDifferent.csv"));
    assert_eq!(
        header,
        [
            "tenant",
            "ucode",
            "batch",
            "invoice_no",
            "returnQuantityInInwardInvoice",
            "returnQuantityInPR",
            "diff",
            "status",
            "source_tenant",
        ]
    );
    assert_eq!(
        rows,
        [
            ["th2", "000002", "B1", "DN1", "3", "4", "1", "live", "th1"],
            ["th2", "000001", "B1", "DN2", "2", "0", "-2", "live", "th1"],
        ]
    );
}

// ---------------------------------------------------------------------------
// Test: dispatched stock transfers are looked up at each destination
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dispatched_transfers_missing_at_destination_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let transfer = |id: i64, invoice: &str, dest: &str| {
        Record::new()
            .with("id", id)
            .with("invoice_no", invoice)
            .with("dest_id", dest)
            .with("status", "DISPATCHED")
            .with("created_on", "2025-08-23")
    };
    let transfers = vec![transfer(1, "I1", "th2"), transfer(2, "I2", "th2"), transfer(3, "I3", "th3")];
    let source = Arc::new(FakeSource::new(move |db, sql, params| match db {
        "th1" if sql.contains("FROM stock_transfer") => {
            assert_eq!(text_params(params), ["2025-08-22"]);
            Ok(transfers.clone())
        }
        "th2" | "th3" => Ok(params
            .iter()
            .filter(|p| p.as_str() == Some("I1"))
            .map(|p| Record::new().with("invoice_no", p.clone()))
            .collect()),
        other => Err(unreachable(other)),
    }));
    let runner = Runner::new(config(dir.path(), &[]), source.clone()).unwrap();

    let summary = runner
        .run_for(Check::StDispatchedInwardNotCreated, tenants(&["th1"]), partners(&[]))
        .await
        .unwrap();

    assert!(summary.all_succeeded());
    assert_eq!(source.calls_to("th2", "FROM inward_invoice"), 1);
    assert_eq!(source.calls_to("th3", "FROM inward_invoice"), 1);
    let (header, mut rows) = read_csv(&dir.path().join("stDispatchInwardNotCreated.csv"));
    assert_eq!(
        header,
        ["id", "invoice_no", "dest_id", "status", "created_on", "tenant", "source_tenant"]
    );
    rows.sort();
    assert_eq!(rows[0][1..], ["I2", "th2", "DISPATCHED", "2025-08-23", "th2", "th1"]);
    assert_eq!(rows[1][1..], ["I3", "th3", "DISPATCHED", "2025-08-23", "th3", "th1"]);
}

// ---------------------------------------------------------------------------
// Test: the invoice-details input decides which tenants run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invoice_details_input_drives_the_tenant_list() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.csv");
    std::fs::write(&input, "tenant,invoice_no\nth1,A\nth2,B\nth1,C\nth9,D\n").unwrap();
    let source = Arc::new(FakeSource::new(|db, _, _| Err(unreachable(db))));
    let cfg = config(
        dir.path(),
        &[("RECON_INPUT", input.to_str().unwrap()), ("EXCLUDE_TENANTS", "th9"), ("BATCH_SIZE", "1")],
    );
    let runner = Runner::new(cfg, source.clone()).unwrap();

    let summary = runner.run(Check::InvoiceSubmittedPrNotCreated).await.unwrap();

    let mut succeeded = summary.succeeded.clone();
    succeeded.sort();
    assert_eq!(succeeded, tenants(&["th1", "th2"]));
    assert_eq!(summary.records_written, 0);
    assert_eq!(source.calls.lock().unwrap().len(), 0);
}

#[tokio::test]
async fn invoice_details_without_input_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::new(|_, _, _| Ok(Vec::new())));
    let runner = Runner::new(config(dir.path(), &[]), source).unwrap();

    let err = runner.run(Check::InvoiceSubmittedPrNotCreated).await.unwrap_err();

    assert_matches!(err, WorkError::Other(_));
}
