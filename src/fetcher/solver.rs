//! Script challenges that compute a form answer.
//!
//! Some interstitials ship a hidden form plus a script that fills one of its
//! fields (usually from arithmetic over obfuscated literals and the page's
//! host name) and submits it after a timeout. [`solve`] runs that script in
//! an embedded engine against a small DOM stand-in and returns the filled
//! form. Anything needing a real layout or network access is left to the
//! browser tier.

use std::fmt::Display;
use std::sync::LazyLock;
use std::time::Duration;

use boa_engine::{Context, Source as Script};
use scraper::{Html, Selector};
use tracing::debug;
use url::form_urlencoded;
use url::Url;

use crate::app::{AlbumdexError, Result};

/// Loop iterations a challenge script may run
const LOOP_LIMIT: u64 = 1_000_000;
const RECURSION_LIMIT: usize = 256;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static FORM: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"form#challenge-form, form[id*="challenge"], form[id*="chl"]"#));
static INPUT: LazyLock<Selector> = LazyLock::new(|| selector("input[name]"));
static INLINE_SCRIPT: LazyLock<Selector> = LazyLock::new(|| selector("script:not([src])"));

/// Globals the challenge script sees. `__HOST__` and `__HREF__` are
/// replaced with JSON string literals before evaluation.
const DOM_SHIM: &str = r#"
var __fields = {};
var __cookies = [];
var __delay = 0;
function __element(id) {
  return {
    id: id, value: "", innerHTML: "", innerText: "", style: {},
    firstChild: { href: "__ORIGIN__/" },
    setAttribute: function (k, v) { this[k] = v; },
    getAttribute: function (k) { return this[k]; },
    appendChild: function (c) { return c; },
    submit: function () {}
  };
}
var document = {
  getElementById: function (id) {
    if (!(id in __fields)) { __fields[id] = __element(id); }
    return __fields[id];
  },
  createElement: function (tag) { return __element(""); },
  addEventListener: function (name, fn) { fn(); },
  querySelector: function () { return __element(""); }
};
Object.defineProperty(document, "cookie", {
  get: function () { return __cookies.join("; "); },
  set: function (v) { __cookies.push(String(v)); }
});
var location = { hostname: __HOST__, host: __HOST__, href: __HREF__, protocol: __PROTOCOL__ };
var window = { document: document, location: location, navigator: { userAgent: "Mozilla/5.0" } };
var navigator = window.navigator;
function setTimeout(fn, ms) {
  __delay = Math.max(__delay, Number(ms) || 0);
  if (typeof fn === "function") { fn(); }
  return 0;
}
function setInterval(fn, ms) { return setTimeout(fn, ms); }
"#;

/// How the filled form is sent back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMethod {
    Get,
    Post,
}

/// A filled challenge form, ready to submit.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub action: Url,
    pub method: SubmitMethod,
    pub fields: Vec<(String, String)>,
    /// Raw `document.cookie` assignments made by the script
    pub cookies: Vec<String>,
    /// Timeout the script asked for before submitting
    pub delay: Duration,
}

impl Solution {
    /// The action URL, with the fields as the query for GET forms
    pub fn submit_url(&self) -> Url {
        let mut url = self.action.clone();
        if self.method == SubmitMethod::Get {
            url.set_query(None);
            url.query_pairs_mut().extend_pairs(&self.fields);
        }
        url
    }

    /// `application/x-www-form-urlencoded` body of the fields
    pub fn form_body(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.fields)
            .finish()
    }

    pub fn answer(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

/// The parts of a challenge page the solver needs
#[derive(Debug, Clone, PartialEq)]
struct ChallengeForm {
    action: Option<String>,
    method: SubmitMethod,
    /// Prefilled fields, in document order
    fields: Vec<(String, String)>,
    /// `(element id, field name)` of the field the script fills
    answer: (String, String),
    script: String,
}

fn find_form(html: &str) -> Option<ChallengeForm> {
    let document = Html::parse_document(html);
    let form = document.select(&FORM).next()?;

    let mut fields = Vec::new();
    let mut answer = None;
    for input in form.select(&INPUT) {
        let el = input.value();
        let Some(name) = el.attr("name") else {
            continue;
        };
        let value = el.attr("value").unwrap_or("");
        match el.attr("id") {
            Some(id) if value.is_empty() && answer.is_none() => {
                answer = Some((id.to_string(), name.to_string()));
            }
            _ => fields.push((name.to_string(), value.to_string())),
        }
    }

    let script = document
        .select(&INLINE_SCRIPT)
        .map(|s| s.text().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n");
    if script.trim().is_empty() {
        return None;
    }

    let method = match form.value().attr("method") {
        Some(m) if m.eq_ignore_ascii_case("post") => SubmitMethod::Post,
        _ => SubmitMethod::Get,
    };
    Some(ChallengeForm {
        action: form.value().attr("action").map(str::to_string),
        method,
        fields,
        answer: answer?,
        script,
    })
}

fn script_error(e: impl Display) -> AlbumdexError {
    AlbumdexError::Script(e.to_string())
}

fn js_string(value: &str) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// What the script left behind
struct Evaluated {
    answer: String,
    cookies: Vec<String>,
    delay_ms: f64,
}

/// Run `script` against the DOM stand-in. The engine is not `Send`, so it
/// lives and dies inside this call.
fn evaluate(script: &str, answer_id: &str, page_url: &Url) -> Result<Evaluated> {
    let host = page_url.host_str().unwrap_or_default();
    let origin = page_url.origin().ascii_serialization();
    let shim = DOM_SHIM
        .replace("__ORIGIN__", &origin)
        .replace("__HOST__", &js_string(host)?)
        .replace("__HREF__", &js_string(page_url.as_str())?)
        .replace("__PROTOCOL__", &js_string(&format!("{}:", page_url.scheme()))?);

    let mut context = Context::default();
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(LOOP_LIMIT);
    context.runtime_limits_mut().set_recursion_limit(RECURSION_LIMIT);

    context
        .eval(Script::from_bytes(&shim))
        .map_err(script_error)?;
    context
        .eval(Script::from_bytes(script))
        .map_err(script_error)?;

    let mut read = |expr: String| -> Result<String> {
        let value = context
            .eval(Script::from_bytes(&expr))
            .map_err(script_error)?;
        let text = value.to_string(&mut context).map_err(script_error)?;
        Ok(text.to_std_string_escaped())
    };
    let answer = read(format!(
        "String(document.getElementById({}).value)",
        js_string(answer_id)?
    ))?;
    let cookies: Vec<String> = serde_json::from_str(&read("JSON.stringify(__cookies)".into())?)?;
    let delay_ms = read("String(__delay)".into())?.parse::<f64>().unwrap_or(0.0);

    Ok(Evaluated {
        answer,
        cookies,
        delay_ms,
    })
}

/// Solve a script challenge on `html`, served from `page_url`.
///
/// `Ok(None)` when the page carries no challenge form; `Err` when it does but
/// the script could not be run or left the answer empty.
pub fn solve(html: &str, page_url: &Url) -> Result<Option<Solution>> {
    let Some(form) = find_form(html) else {
        return Ok(None);
    };
    let (answer_id, answer_name) = form.answer;

    let evaluated = evaluate(&form.script, &answer_id, page_url)?;
    if evaluated.answer.is_empty() {
        return Err(AlbumdexError::Script(format!(
            "script left #{answer_id} empty"
        )));
    }
    debug!(
        url = %page_url,
        field = %answer_name,
        answer = %evaluated.answer,
        "[challenge] script solved"
    );

    let action = match form.action.as_deref() {
        Some(action) if !action.trim().is_empty() => page_url.join(action.trim())?,
        _ => page_url.clone(),
    };
    let mut fields = form.fields;
    fields.push((answer_name, evaluated.answer));

    let delay = Duration::try_from_secs_f64(evaluated.delay_ms / 1000.0).unwrap_or(Duration::ZERO);
    Ok(Some(Solution {
        action,
        method: form.method,
        fields,
        cookies: evaluated.cookies,
        delay,
    }))
}
