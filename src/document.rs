//! The most recently fetched page, parsed once into owned data.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use url::Url;

static FORM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("form").expect("static selector"));
static CONTROL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input, select, textarea").expect("static selector"));
static OPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("option").expect("static selector"));
static SCRIPT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script").expect("static selector"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMethod {
    Get,
    Post,
}

/// An HTML form with its successful controls, ready to be resubmitted.
#[derive(Debug, Clone)]
pub struct Form {
    name: Option<String>,
    id: Option<String>,
    action: Url,
    method: FormMethod,
    fields: Vec<(String, String)>,
    submit: Option<(String, String)>,
}

impl Form {
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Action resolved against the page URL; the page itself when absent.
    #[must_use]
    pub fn action(&self) -> &Url {
        &self.action
    }

    #[must_use]
    pub fn method(&self) -> FormMethod {
        self.method
    }

    #[must_use]
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == field)
    }

    /// Override a field value, appending the field if the form lacks it.
    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| name == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field.to_owned(), value)),
        }
    }

    /// Fields as the browser would send them, including the first named submit control.
    #[must_use]
    pub fn submission(&self) -> Vec<(String, String)> {
        let mut pairs = self.fields.clone();
        if let Some(submit) = &self.submit {
            if !self.has_field(&submit.0) {
                pairs.push(submit.clone());
            }
        }
        pairs
    }

    fn matches_name(&self, wanted: &str) -> bool {
        self.name.as_deref() == Some(wanted) || self.id.as_deref() == Some(wanted)
    }

    fn parse(element: ElementRef<'_>, page: &Url) -> Self {
        let attrs = element.value();
        let action = attrs
            .attr("action")
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .and_then(|a| page.join(a).ok())
            .unwrap_or_else(|| page.clone());
        let method = match attrs.attr("method") {
            Some(m) if m.eq_ignore_ascii_case("post") => FormMethod::Post,
            _ => FormMethod::Get,
        };

        let mut fields = Vec::new();
        let mut submit = None;
        for control in element.select(&CONTROL) {
            let el = control.value();
            let Some(name) = el.attr("name").filter(|n| !n.is_empty()) else {
                continue;
            };
            if el.attr("disabled").is_some() {
                continue;
            }
            match el.name() {
                "select" => {
                    let options: Vec<ElementRef<'_>> = control.select(&OPTION).collect();
                    let chosen = options
                        .iter()
                        .find(|o| o.value().attr("selected").is_some())
                        .or_else(|| options.first());
                    if let Some(option) = chosen {
                        let value = option
                            .value()
                            .attr("value")
                            .map_or_else(|| option.text().collect::<String>(), str::to_owned);
                        fields.push((name.to_owned(), value.trim().to_owned()));
                    }
                }
                "textarea" => fields.push((name.to_owned(), control.text().collect())),
                _ => {
                    let kind = el.attr("type").unwrap_or("text").to_ascii_lowercase();
                    let value = el.attr("value").unwrap_or_default().to_owned();
                    match kind.as_str() {
                        "submit" => {
                            if submit.is_none() {
                                submit = Some((name.to_owned(), value));
                            }
                        }
                        "image" | "button" | "reset" | "file" => {}
                        "checkbox" | "radio" => {
                            if el.attr("checked").is_some() {
                                let value = if value.is_empty() { "on".to_owned() } else { value };
                                fields.push((name.to_owned(), value));
                            }
                        }
                        _ => fields.push((name.to_owned(), value)),
                    }
                }
            }
        }

        Self {
            name: attrs.attr("name").map(str::to_owned),
            id: attrs.attr("id").map(str::to_owned),
            action,
            method,
            fields,
            submit,
        }
    }
}

/// A fetched page. Replaced on every navigation, never mutated in place.
#[derive(Debug, Clone)]
pub struct Document {
    url: Url,
    status: u16,
    body: String,
    forms: Vec<Form>,
    scripts: Vec<String>,
}

impl Document {
    #[must_use]
    pub fn parse(url: Url, status: u16, body: String) -> Self {
        let html = Html::parse_document(&body);
        let forms = html.select(&FORM).map(|f| Form::parse(f, &url)).collect();
        let scripts = html
            .select(&SCRIPT)
            .filter(|s| s.value().attr("src").is_none())
            .map(|s| s.text().collect::<String>())
            .filter(|text| !text.trim().is_empty())
            .collect();

        Self {
            url,
            status,
            body,
            forms,
            scripts,
        }
    }

    /// Final URL after redirects.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub fn forms(&self) -> &[Form] {
        &self.forms
    }

    /// Texts of inline `<script>` blocks, in document order.
    #[must_use]
    pub fn scripts(&self) -> &[String] {
        &self.scripts
    }

    /// Form whose `name` or `id` equals `name`.
    #[must_use]
    pub fn form_named(&self, name: &str) -> Option<&Form> {
        self.forms.iter().find(|f| f.matches_name(name))
    }

    /// First form carrying a control named `field`.
    #[must_use]
    pub fn form_with_field(&self, field: &str) -> Option<&Form> {
        self.forms.iter().find(|f| f.has_field(field))
    }

    #[must_use]
    pub fn contains_text(&self, needle: &str) -> bool {
        self.body.contains(needle)
    }
}
