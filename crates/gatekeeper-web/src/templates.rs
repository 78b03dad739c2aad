use gatekeeper_core::COUNTDOWN_DISPLAY_SECONDS;
use maud::{html, Markup, DOCTYPE};

fn page(title: &str, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (title) }
                meta name="viewport" content="width=device-width, initial-scale=1";
            }
            body {
                (body)
            }
        }
    }
}

/// Rendered on a successful `/v` completion. The redirect is client-side
/// and delayed by `COUNTDOWN_DISPLAY_SECONDS` purely for UX — the dwell
/// floors that actually gate bypass are enforced server-side before this
/// page is ever reached.
pub fn verified_page(deep_link: &str) -> Markup {
    page(
        "Verified",
        html! {
            h1 { "You're verified" }
            p id="countdown" { (COUNTDOWN_DISPLAY_SECONDS) "s..." }
            script {
                (maud::PreEscaped(format!(
                    r#"
                    let remaining = {seconds};
                    const el = document.getElementById('countdown');
                    const timer = setInterval(() => {{
                        remaining -= 1;
                        el.textContent = remaining + 's...';
                        if (remaining <= 0) {{
                            clearInterval(timer);
                            window.location.href = {dest};
                        }}
                    }}, 1000);
                    "#,
                    seconds = COUNTDOWN_DISPLAY_SECONDS,
                    dest = serde_json::to_string(deep_link).unwrap_or_else(|_| "\"\"".into()),
                )))
            }
        },
    )
}

pub fn error_page(message: &str) -> Markup {
    page(
        "Verification failed",
        html! {
            h1 { "Verification failed" }
            p { (message) }
        },
    )
}
