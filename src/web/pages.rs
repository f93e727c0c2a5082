//! Server-rendered HTML pages.

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::auth::User;

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
</head>
<body>
<nav><a href="/">Home</a> | <a href="/user/profile">Profile</a></nav>
<main>
{body}
</main>
</body>
</html>
"#,
        title = encode_text(title),
        body = body,
    )
}

/// Landing page showing the value remembered in the session.
pub fn home(from_session: &str) -> String {
    layout(
        "Home",
        &format!(
            "<h1>Home</h1>\n<p>From Session: {}</p>",
            encode_text(from_session)
        ),
    )
}

/// Login form, optionally with an error banner and the email re-filled.
pub fn login(error: Option<&str>, email: &str) -> String {
    let banner = error
        .map(|message| format!(r#"<p class="error">{}</p>"#, encode_text(message)))
        .unwrap_or_default();

    layout(
        "Login",
        &format!(
            r#"<h1>Login</h1>
{banner}
<form method="post" action="/login">
<label>Email <input type="email" name="email" value="{email}"></label>
<label>Password <input type="password" name="password"></label>
<button type="submit">Login</button>
</form>"#,
            banner = banner,
            email = encode_double_quoted_attribute(email),
        ),
    )
}

pub fn profile(user: &User, image: Option<&str>) -> String {
    let picture = match image {
        Some(file_name) => format!("<p>Profile picture: {}</p>", encode_text(file_name)),
        None => "<p>No profile picture yet.</p>".to_string(),
    };

    layout(
        "Profile",
        &format!(
            r#"<h1>User Profile</h1>
<p>Name: {name}</p>
<p>Email: {email}</p>
{picture}
<form method="post" action="/user/upload-profile-pic" enctype="multipart/form-data">
<label>Picture <input type="file" name="file" accept="image/*"></label>
<button type="submit">Upload</button>
</form>
<form method="post" action="/logout"><button type="submit">Logout</button></form>"#,
            name = encode_text(&user.full_name()),
            email = encode_text(&user.email),
            picture = picture,
        ),
    )
}
