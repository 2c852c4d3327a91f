//! A small propositional-calculus database shared by the unit tests.

use crate::{db::MemoryDb, reader};

/// ax-1/ax-2/ax-mp plus a handful of statements exercising the corner cases:
/// a $d-carrying axiom, discouragement tags, a mathbox, an unknown (`?`)
/// proof and a deliberately roundabout proof of `id` (the short route is
/// `wph ax-id`).
pub fn propositional() -> MemoryDb {
    reader::parse_database(SOURCE).unwrap()
}

const SOURCE: &str = r#"
$c wff |- ( ) -> $.
$v ph ps ch $.
wph $f wff ph $.
wps $f wff ps $.
wch $f wff ch $.
wi $a wff ( ph -> ps ) $.
ax-1 $a |- ( ph -> ( ps -> ph ) ) $.
ax-2 $a |- ( ( ph -> ( ps -> ch ) ) -> ( ( ph -> ps ) -> ( ph -> ch ) ) ) $.
${
  min $e |- ph $.
  maj $e |- ( ph -> ps ) $.
  ax-mp $a |- ps $.
$}
${
  $d ph ps $.
  ax-dist $a |- ( ph -> ( ps -> ph ) ) $.
$}
$( (New usage is discouraged.) $)
ax-meredith $a |- ( ph -> ( ps -> ps ) ) $.
ax-id $a |- ( ph -> ph ) $.
id $p |- ( ph -> ph ) $=
  wph wph wph wi wi wph wph wi wph wph ax-1
  wph wph wph wi wph wi wi wph wph wph wi wi wph wph wi wi
  wph wph wph wi ax-1 wph wph wph wi wph ax-2 ax-mp ax-mp $.
${
  a1i.1 $e |- ph $.
  a1i $p |- ( ps -> ph ) $= wph wps wph wi a1i.1 wph wps ax-1 ax-mp $.
$}
th1 $p |- ( ph -> ph ) $= ? $.
$( (Proof modification is discouraged.) $)
thd $p |- ( ph -> ph ) $= wph ax-id $.
$( Mathbox for Alice. $)
mbox1 $p |- ( ph -> ( ps -> ph ) ) $= wph wps ax-1 $.
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{StatementDb, StmtKind};

    #[test]
    fn fixture_parses() {
        let db = propositional();
        assert_eq!(db.kind(db.by_label("id").unwrap()), StmtKind::Provable);
        assert_eq!(db.stored_proof(db.by_label("id").unwrap()).unwrap().len(), 40);
    }
}
