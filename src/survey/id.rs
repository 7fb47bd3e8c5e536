use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Serialize, Deserialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub Uuid);
impl Id {
    pub fn new() -> Id {
        Id(Uuid::new_v4())
    }
}
impl Display for Id {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl FromStr for Id {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Id)
    }
}
impl PartialEq<Uuid> for Id {
    fn eq(&self, other: &Uuid) -> bool {
        self.0 == *other
    }
}
