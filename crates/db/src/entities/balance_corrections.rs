//! `SeaORM` Entity for the balance_corrections audit table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "balance_corrections")]
#[allow(missing_docs)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub account_code: String,
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub recorded_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub derived_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub difference: Decimal,
    pub reason: String,
    pub corrected_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::AccountCode",
        to = "super::accounts::Column::Code"
    )]
    Accounts,
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Accounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
