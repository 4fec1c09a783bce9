use scraper::{Html, Selector};

use crate::error::{DownloadError, Result};

/// An element pulled out of a parsed page, detached from the parse tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub text: String,
    attrs: Vec<(String, String)>,
}

impl Node {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Query capability over a parsed page.
///
/// Site-specific selectors live with the code that scrapes the site; this
/// trait only knows how to run them.
pub trait Document {
    fn find_all(&self, selector: &str) -> Result<Vec<Node>>;

    fn first(&self, selector: &str) -> Result<Option<Node>> {
        Ok(self.find_all(selector)?.into_iter().next())
    }

    fn first_attr(&self, selector: &str, attr: &str) -> Result<Option<String>> {
        Ok(self
            .find_all(selector)?
            .into_iter()
            .find_map(|node| node.attr(attr).map(str::to_string)))
    }

    fn first_text(&self, selector: &str) -> Result<Option<String>> {
        Ok(self.first(selector)?.map(|node| node.text))
    }
}

// `scraper::Html` is not `Send`, so parse, query and drop it between awaits
pub struct HtmlDocument {
    html: Html,
}

impl HtmlDocument {
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }
}

impl Document for HtmlDocument {
    fn find_all(&self, selector: &str) -> Result<Vec<Node>> {
        let parsed = Selector::parse(selector)
            .map_err(|_| DownloadError::InvalidInput(format!("invalid selector `{}`", selector)))?;

        let nodes = self
            .html
            .select(&parsed)
            .map(|el| Node {
                text: el.text().collect::<String>(),
                attrs: el
                    .value()
                    .attrs()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect(),
            })
            .collect();

        Ok(nodes)
    }
}
