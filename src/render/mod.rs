//! Report rendering.
//!
//! Surviving species are rendered as a fixed-format HTML fragment: a count
//! sentence, then one lookup link per species followed by its reference
//! description. Names are inserted verbatim unless escaping is requested.

mod html;
mod page;
mod sink;

pub use html::html_escape;
pub use page::{replace_element_content, ReportPage};
pub use sink::OutputSink;

use crate::reconcile::Reconciliation;
use crate::reference::ReferenceTable;

/// Default per-species lookup page.
pub const DEFAULT_LOOKUP_URL: &str = "https://bison.usgs.gov/index.jsp";

/// Default portal linked from the summary sentence.
pub const DEFAULT_PORTAL_URL: &str = "https://bison.usgs.gov";

/// Default id of the element receiving the fragment.
pub const DEFAULT_ELEMENT_ID: &str = "listHTML3";

/// Rendering options.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub lookup_url: String,
    pub portal_url: String,
    /// HTML-escape names and descriptions before insertion.
    pub escape: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            lookup_url: DEFAULT_LOOKUP_URL.to_string(),
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            escape: false,
        }
    }
}

/// Rendered fragment plus the count it reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedList {
    pub count: usize,
    pub html: String,
}

/// Render the survivors of a reconciliation.
pub fn render(
    reconciliation: &Reconciliation,
    reference: &ReferenceTable,
    options: &RenderOptions,
) -> RenderedList {
    let mut count = 0;
    let mut list = String::from("<i>");

    for species in reconciliation.survivors() {
        count += 1;
        let description = reference.describe(&species.name).unwrap_or("");
        let (name, description) = if options.escape {
            (html_escape(&species.name), html_escape(description))
        } else {
            (species.name.clone(), description.to_string())
        };

        list.push_str(&format!(
            "<br><a href ='{}?scientificName={}&ITIS=itis' target='_blank'>{}</a> {}",
            options.lookup_url, name, name, description
        ));
    }

    let portal = format!(
        "<a href='{}' target='_blank'>BISON</a>",
        options.portal_url
    );
    let html = format!(
        "There are {} species of non-natives documented in states bordering this state \
         that are not documented in the state itself in {}.<br>\
         Click on a name to open a tab with the species full distribution in {}.<br>{}</i>",
        count, portal, portal, list
    );

    RenderedList { count, html }
}
