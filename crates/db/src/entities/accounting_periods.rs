//! `SeaORM` Entity for the accounting_periods table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounting_periods")]
#[allow(missing_docs)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub start_date: Date,
    pub end_date: Date,
    pub description: String,
    pub is_closed: bool,
    pub closing_journal_id: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub total_revenue: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub total_expense: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub net_income: Decimal,
    pub closed_at: Option<DateTimeWithTimeZone>,
    pub reopened_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
