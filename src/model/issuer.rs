/// A tracked financial entity identified by its ticker symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issuer {
    pub id: i64,
    pub ticker: String,
    pub name: String,
    pub sector: Option<String>,
}
