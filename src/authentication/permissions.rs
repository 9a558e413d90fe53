use warp::http::Method;

use crate::{
    jwt::SessionData,
    schema::{UserRole, Uuid},
};

const USER_ACTIONS: &[ActionType] = &[
    ActionType::ManageOwnAccount,
    ActionType::ManageOwnFavorites,
    ActionType::ManageOwnShoppingCart,
    ActionType::ManageOwnSubscriptions,
    ActionType::CreateRecipes,
    ActionType::ManageOwnRecipes,
];

const ADMIN_ACTIONS: &[ActionType] = &[
    ActionType::ManageOwnAccount,
    ActionType::ManageOwnFavorites,
    ActionType::ManageOwnShoppingCart,
    ActionType::ManageOwnSubscriptions,
    ActionType::CreateRecipes,
    ActionType::ManageOwnRecipes,
    ActionType::ManageCatalog,
];

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActionType {
    ManageOwnAccount,
    ManageOwnFavorites,
    ManageOwnShoppingCart,
    ManageOwnSubscriptions,

    CreateRecipes,
    ManageOwnRecipes,

    ManageCatalog,
}

impl UserRole {
    pub fn actions(&self) -> &'static [ActionType] {
        match self {
            UserRole::User => USER_ACTIONS,
            UserRole::Admin | UserRole::Superuser => ADMIN_ACTIONS,
        }
    }
}

impl ActionType {
    pub fn authenticate(self, session: &SessionData) -> bool {
        session.role.actions().contains(&self)
    }
}

pub fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Reads are open to everyone, mutations only to the resource's author.
/// A resource whose author was deleted cannot be mutated at all.
pub fn is_author_or_read_only(
    method: &Method,
    session: Option<&SessionData>,
    author_id: Option<Uuid>,
) -> bool {
    if is_safe_method(method) {
        return true;
    }

    match (session, author_id) {
        (Some(session), Some(author_id)) => session.user_id == author_id,
        _ => false,
    }
}

pub fn is_admin_role(session: Option<&SessionData>) -> bool {
    session.map(|s| s.role.is_admin()).unwrap_or(false)
}
