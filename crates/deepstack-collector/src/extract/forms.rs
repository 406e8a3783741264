//! Form discovery in the main document and every child frame.

use deepstack_signals::FormDescriptor;
use serde_json::Value;

use crate::error::ExtractError;
use crate::navigator::PageSession;
use crate::renderer::FrameInfo;

/// Walks `document.forms` and returns one descriptor per form. Controls are
/// kept when their type is on the key-type list, their name or id contains a
/// key fragment, or they submit the form.
///
/// Form properties are read through the `HTMLFormElement` prototype and
/// attributes, since a control named `id`, `action` or `method` shadows the
/// plain property with the control element itself.
pub const FORM_WALK_SCRIPT: &str = r#"(() => {
  const keyTypes = ["email", "text", "tel", "submit", "hidden", "password", "search", "url",
    "number", "checkbox", "radio", "date", "select-one", "select-multiple", "textarea", "button"];
  const keyNames = ["email", "name", "firstname", "first_name", "last_name", "lastname", "phone",
    "tel", "mobile", "company", "website", "job_title", "query", "q", "search", "address", "city",
    "state", "zip", "postal", "country", "utm_"];
  const str = (v) => (typeof v === 'string' && v !== '' ? v : null);
  const formProp = (form, prop) => {
    const desc = Object.getOwnPropertyDescriptor(HTMLFormElement.prototype, prop);
    return desc && desc.get ? desc.get.call(form) : null;
  };
  return Array.from(document.forms).map((form) => {
    const attr = (n) => Element.prototype.getAttribute.call(form, n);
    const handler = {};
    if (attr('data-netlify') === 'true') handler.netlify_form = true;
    if (attr('data-hs-cf-bound') === 'true') handler.hubspot_form_indicator = true;
    if (str(attr('data-marketo-form-id'))) handler.marketo_form_id = attr('data-marketo-form-id');
    const fields = [];
    Array.from(formProp(form, 'elements') || []).forEach((el) => {
      const tag = String(el.tagName || '').toLowerCase();
      const type = (str(el.type) || tag).toLowerCase();
      const name = str(el.name);
      const id = str(el.id);
      const lname = (name || '').toLowerCase();
      const lid = (id || '').toLowerCase();
      let key = keyTypes.includes(type)
        || keyNames.some((part) => lname.includes(part) || lid.includes(part));
      if (type === 'submit') key = true;
      if (!key) return;
      const field = {
        name,
        type,
        id,
        value: str(el.value),
        placeholder: str(el.placeholder),
      };
      if (tag === 'button' || type === 'submit') {
        const text = (typeof el.textContent === 'string' ? el.textContent : '').trim();
        field.text = text || str(el.value) || '';
      }
      fields.push(field);
    });
    const method = str(formProp(form, 'method')) || 'get';
    return {
      form_id: str(attr('id')),
      form_name: str(attr('name')),
      form_classes: (attr('class') || '').split(/\s+/).filter(Boolean),
      form_action: str(formProp(form, 'action')),
      form_method: method.toUpperCase(),
      handler_attributes: handler,
      input_fields_summary: fields,
    };
  });
})()"#;

/// Decode a walk result one form at a time; a descriptor of the wrong shape
/// is logged and dropped without losing its siblings.
fn decode(value: Value) -> Result<Vec<FormDescriptor>, ExtractError> {
    let entries: Vec<Value> = match value {
        Value::Null => return Ok(Vec::new()),
        other => serde_json::from_value(other)?,
    };
    let mut forms = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<FormDescriptor>(entry) {
            Ok(form) => forms.push(form),
            Err(e) => tracing::warn!(index, "skipping malformed form descriptor: {e}"),
        }
    }
    Ok(forms)
}

/// Forms of the main document.
pub async fn main_document_forms(session: &PageSession) -> Result<Vec<FormDescriptor>, ExtractError> {
    let value = session.context().execute_js(FORM_WALK_SCRIPT).await?;
    decode(value)
}

/// Frames worth walking: attached, with a real URL.
pub fn walkable(frame: &FrameInfo) -> bool {
    !frame.url.is_empty() && frame.url != "about:blank"
}

/// Forms of every walkable child frame, tagged with their frame. A frame
/// that fails to evaluate is logged and skipped.
pub async fn frame_forms(session: &PageSession) -> Vec<FormDescriptor> {
    let frames = match session.context().child_frames().await {
        Ok(frames) => frames,
        Err(e) => {
            tracing::warn!(url = %session.target, "could not list frames: {e:#}");
            return Vec::new();
        }
    };
    if frames.is_empty() {
        return Vec::new();
    }

    let mut found = Vec::new();
    let mut walked = 0usize;
    for frame in frames.iter().filter(|f| walkable(f)) {
        walked += 1;
        let forms = match session
            .context()
            .execute_js_in_frame(&frame.id, FORM_WALK_SCRIPT)
            .await
            .map_err(ExtractError::from)
            .and_then(decode)
        {
            Ok(forms) => forms,
            Err(e) => {
                tracing::warn!(
                    frame_url = %frame.url,
                    frame_name = frame.name.as_deref().unwrap_or("N/A"),
                    "error evaluating forms in frame: {e}"
                );
                continue;
            }
        };
        found.extend(
            forms
                .into_iter()
                .map(|form| form.in_frame(&frame.url, frame.name.as_deref())),
        );
    }

    if walked > 0 {
        tracing::info!(frames = walked, forms = found.len(), "analyzed child frames");
    } else {
        tracing::debug!(frames = frames.len(), "all child frames skipped");
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::test_support::session;
    use crate::renderer::scripted::{ScriptedFrame, ScriptedPage};
    use serde_json::json;

    fn form(id: &str) -> Value {
        json!({
            "form_id": id,
            "form_name": null,
            "form_classes": ["hs-form"],
            "form_action": "https://forms.test/submit",
            "form_method": "POST",
            "handler_attributes": {"hubspot_form_indicator": true},
            "input_fields_summary": [
                {"name": "email", "type": "email", "id": null, "value": null, "placeholder": "Email"},
                {"name": null, "type": "submit", "id": null, "value": "Go", "placeholder": null, "text": "Go"}
            ]
        })
    }

    const HTML: &str = "<html><head><title>Acme</title></head><body></body></html>";

    #[tokio::test]
    async fn test_main_document_forms_decode() {
        let page = ScriptedPage::new(HTML).with_script(FORM_WALK_SCRIPT, json!([form("signup")]));
        let session = session(page).await;
        let forms = main_document_forms(&session).await.unwrap();
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].form_id.as_deref(), Some("signup"));
        assert_eq!(forms[0].handler_attributes.hubspot_form_indicator, Some(true));
        assert_eq!(forms[0].input_fields_summary[1].text.as_deref(), Some("Go"));
        assert!(!forms[0].found_in_iframe);
    }

    #[tokio::test]
    async fn test_frames_skip_blank_and_survive_errors() {
        let page = ScriptedPage::new(HTML)
            .with_frame(ScriptedFrame::new("blank", "about:blank", None).with_script(FORM_WALK_SCRIPT, json!([form("x")])))
            .with_frame(ScriptedFrame::new("empty", "", None))
            .with_frame(
                ScriptedFrame::new("broken", "https://ads.test/", None)
                    .with_script_error(FORM_WALK_SCRIPT, "cross-origin frame"),
            )
            .with_frame(
                ScriptedFrame::new("hs", "https://forms.test/embed", Some("hs-form-frame"))
                    .with_script(FORM_WALK_SCRIPT, json!([form("lead")])),
            );
        let session = session(page).await;
        let forms = frame_forms(&session).await;
        assert_eq!(forms.len(), 1);
        assert!(forms[0].found_in_iframe);
        assert_eq!(forms[0].iframe_url.as_deref(), Some("https://forms.test/embed"));
        assert_eq!(forms[0].iframe_name.as_deref(), Some("hs-form-frame"));
    }

    #[tokio::test]
    async fn test_malformed_form_does_not_drop_siblings() {
        let mut shadowed = form("wp-contact");
        shadowed["form_action"] = json!({});
        let page = ScriptedPage::new(HTML)
            .with_script(FORM_WALK_SCRIPT, json!([shadowed, form("newsletter")]));
        let session = session(page).await;
        let forms = main_document_forms(&session).await.unwrap();
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].form_id.as_deref(), Some("newsletter"));
    }

    #[test]
    fn test_walk_script_avoids_shadowed_form_properties() {
        assert!(FORM_WALK_SCRIPT.contains("HTMLFormElement.prototype"));
        assert!(FORM_WALK_SCRIPT.contains("form_id: str(attr('id'))"));
        assert!(FORM_WALK_SCRIPT.contains("form_action: str(formProp(form, 'action'))"));
        assert!(FORM_WALK_SCRIPT.contains("str(formProp(form, 'method'))"));
        assert!(!FORM_WALK_SCRIPT.contains("form.action"));
        assert!(!FORM_WALK_SCRIPT.contains("form.id"));
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        assert!(decode(json!({"not": "a list"})).is_err());
        assert!(decode(Value::Null).unwrap().is_empty());
    }
}
