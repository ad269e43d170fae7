//! Parse and re-serialize, healing whatever the parser recovers from.

use super::syntax::Stylesheet;
use super::{CssDocument, Stage};
use crate::Result;
use log::debug;

/// Turns arbitrary (possibly malformed) CSS into well-formed CSS.
pub struct Repair;

impl Stage for Repair {
    fn name(&self) -> &'static str {
        "repair"
    }

    fn apply(&self, input: &CssDocument) -> Result<CssDocument> {
        let sheet = Stylesheet::parse(input.as_str());
        debug!("Repaired stylesheet has {} style rules", sheet.style_rule_count());
        Ok(CssDocument::new(sheet.to_css()))
    }
}
