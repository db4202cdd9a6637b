//! Unauthenticated pages

use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};

use crate::error::status_body;

pub const ROBOTS_TXT: &str = "User-agent: *\nDisallow: /\n";

const LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Sign in</title>
</head>
<body>
<main id="zgate-login">
<h1>Sign in</h1>
<form id="login">
<input name="username" autocomplete="username" placeholder="Username">
<input name="password" type="password" autocomplete="current-password" placeholder="Password">
<button type="submit">Sign in</button>
</form>
<ul id="providers"></ul>
</main>
<script>
const form = document.getElementById("login");
form.addEventListener("submit", async (e) => {
  e.preventDefault();
  const body = JSON.stringify({
    username: form.username.value,
    password: form.password.value,
  });
  const resp = await fetch("/auth/session", {
    method: "POST",
    headers: {"Content-Type": "application/json"},
    body,
  });
  if (resp.ok) {
    window.location.reload();
  } else {
    const data = await resp.json().catch(() => ({message: "Login failed"}));
    alert(data.message);
  }
});
fetch("/auth/state").then((r) => r.json()).then((providers) => {
  const list = document.getElementById("providers");
  for (const p of providers) {
    const item = document.createElement("li");
    const link = document.createElement("a");
    link.href = "/auth/request?id=" + encodeURIComponent(p.id);
    link.textContent = "Sign in with " + p.label;
    item.appendChild(link);
    list.appendChild(item);
  }
});
</script>
</body>
</html>
"#;

pub async fn robots_get() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], ROBOTS_TXT)
}

/// Login page served to unauthenticated proxy requests
pub async fn login_page_get() -> Html<&'static str> {
    Html(LOGIN_PAGE)
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, status_body(StatusCode::NOT_FOUND)).into_response()
}
