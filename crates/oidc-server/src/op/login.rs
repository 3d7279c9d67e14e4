//! HTML login page shown by the authorization endpoint.

const STYLE: &str = "\
main { font: 15px/1.4 system-ui, sans-serif; max-width: 22rem; }
main { margin: 12vh auto; padding: 0 1rem; }
fieldset { border: 1px solid #ccd; border-radius: 6px; padding: 1.25rem; }
legend { font-weight: 600; padding: 0 .4rem; }
label, input, button { display: block; width: 100%; box-sizing: border-box; }
input { margin: .25rem 0 .9rem; padding: .5rem; }
button { padding: .55rem; }
p.error { color: #a11; }
p.client { color: #556; }";

/// Render the login form for a pending authorization request.
///
/// Every interpolated value is HTML-escaped.
#[must_use]
pub fn render_login_page(
    client_id: &str,
    auth_request_id: &str,
    username: &str,
    error_message: Option<&str>,
) -> String {
    let error = error_message.map_or_else(String::new, |msg| {
        format!(r#"<p class="error" role="alert">{}</p>"#, html_escape(msg))
    });

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Log in</title><style>{STYLE}</style></head>
<body>
<main>
<form method="post" action="login">
<fieldset>
<legend>Log in</legend>
<p class="client">Client: {client}</p>
{error}
<input type="hidden" name="auth_request_id" value="{request}">
<label>Username <input name="username" value="{user}" autocomplete="username" required></label>
<label>Password
<input name="password" type="password" autocomplete="current-password" required>
</label>
<button>Continue</button>
</fieldset>
</form>
</main>
</body>
</html>"#,
        client = html_escape(client_id),
        request = html_escape(auth_request_id),
        user = html_escape(username),
    )
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
