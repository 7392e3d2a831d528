use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// UUID v4, assigned at insert.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Normalized (trimmed, lowercased) before every insert/update.
    #[sea_orm(unique)]
    pub email: String,

    pub user_name: String,

    pub first_name: String,

    pub last_name: String,

    /// Argon2id password hash; absent for purely federated accounts.
    pub password_hash: Option<String>,

    pub is_active: bool,

    /// JSON-encoded list of role tags (`["admin","user"]`).
    pub roles: String,

    /// Subject identifier at the external identity provider.
    #[sea_orm(unique)]
    pub federated_id: Option<String>,

    pub created_at: String,

    pub updated_at: String,

    pub deleted_at: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::api_keys::Entity")]
    ApiKeys,
}

impl Related<super::api_keys::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApiKeys.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
