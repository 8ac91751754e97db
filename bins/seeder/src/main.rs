//! Seeds the default chart of accounts.
//!
//! Existing codes are left alone, so running the seeder twice is harmless.
//!
//! Usage: cargo run --bin seeder

use anyhow::Context;
use saldo_core::ledger::{Account, AccountType};
use saldo_db::AccountRepository;
use saldo_shared::AppConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = saldo_db::connect_with(&config.database).await?;
    info!("Connected to database");

    let created = AccountRepository::new(db)
        .create_missing(default_chart())
        .await?;
    info!(created, "Seeding complete");
    Ok(())
}

/// Trading-company chart: headers at 1000/2000/3000/4000/5000.
fn default_chart() -> Vec<Account> {
    use AccountType::{Asset, Equity, Expense, Liability, Revenue};

    vec![
        Account::header("1000", "Aset", Asset),
        Account::header("1100", "Aset Lancar", Asset).under("1000"),
        Account::leaf("1101", "Kas", Asset).under("1100"),
        Account::leaf("1102", "Bank", Asset).under("1100"),
        Account::leaf("1114", "PPh 21 Dibayar Dimuka", Asset).under("1100"),
        Account::leaf("1115", "PPh 23 Dibayar Dimuka", Asset).under("1100"),
        Account::header("1200", "Piutang", Asset).under("1000"),
        Account::leaf("1201", "Piutang Usaha", Asset).under("1200"),
        Account::leaf("1240", "PPN Masukan", Asset).under("1200"),
        Account::leaf("1301", "Persediaan Barang Dagangan", Asset).under("1100"),
        Account::header("1500", "Aset Tetap", Asset).under("1000"),
        Account::leaf("1501", "Peralatan Kantor", Asset).under("1500"),
        Account::leaf("1502", "Kendaraan", Asset).under("1500"),
        Account::leaf("1503", "Bangunan", Asset).under("1500"),
        Account::header("2000", "Kewajiban", Liability),
        Account::header("2100", "Kewajiban Lancar", Liability).under("2000"),
        Account::leaf("2101", "Utang Usaha", Liability).under("2100"),
        Account::leaf("2103", "PPN Keluaran", Liability).under("2100"),
        Account::leaf("2104", "PPh yang Dipotong", Liability).under("2100"),
        Account::header("3000", "Ekuitas", Equity),
        Account::leaf("3101", "Modal Pemilik", Equity).under("3000"),
        Account::leaf("3201", "Laba Ditahan", Equity).under("3000"),
        Account::header("4000", "Pendapatan", Revenue),
        Account::leaf("4101", "Pendapatan Penjualan", Revenue).under("4000"),
        Account::leaf("4102", "Pendapatan Jasa/Ongkir", Revenue).under("4000"),
        Account::leaf("4201", "Pendapatan Lain-lain", Revenue).under("4000"),
        Account::header("5000", "Beban", Expense),
        Account::leaf("5101", "Harga Pokok Penjualan", Expense).under("5000"),
        Account::leaf("5201", "Beban Gaji", Expense).under("5000"),
        Account::leaf("5202", "Beban Listrik", Expense).under("5000"),
        Account::leaf("5203", "Beban Telepon", Expense).under("5000"),
        Account::leaf("5204", "Beban Transportasi", Expense).under("5000"),
        Account::leaf("5900", "Beban Umum", Expense).under("5000"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use saldo_core::ledger::ChartOfAccounts;

    #[test]
    fn test_default_chart_is_valid() {
        let chart = ChartOfAccounts::new(default_chart()).unwrap();
        assert!(chart.is_postable("1101"));
        assert!(!chart.is_postable("1000"));
        assert_eq!(chart.get("3201").unwrap().account_type, AccountType::Equity);
    }
}
