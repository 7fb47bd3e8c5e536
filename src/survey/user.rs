use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use super::id::Id;

/// An identified respondent, as forwarded by the authenticating gateway.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct User {
    pub id: Id,
    pub is_superuser: bool,
}

impl User {
    pub const fn new(id: Id, is_superuser: bool) -> User {
        User {
            id,
            is_superuser,
        }
    }
}

/// Whoever issued the current request. `None` is an anonymous caller.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Caller(pub Option<User>);

impl Caller {
    pub const fn anonymous() -> Caller {
        Caller(None)
    }

    pub const fn user(id: Id) -> Caller {
        Caller(Some(User::new(id, false)))
    }

    pub const fn superuser(id: Id) -> Caller {
        Caller(Some(User::new(id, true)))
    }

    pub fn is_superuser(&self) -> bool {
        self.0.map(|u| u.is_superuser).unwrap_or(false)
    }

    pub fn user_id(&self) -> Option<Id> {
        self.0.map(|u| u.id)
    }
}

impl Display for Caller {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.0 {
            None => write!(f, "anonymous"),
            Some(User { id, is_superuser: true }) => write!(f, "superuser {id}"),
            Some(User { id, .. }) => write!(f, "user {id}"),
        }
    }
}
