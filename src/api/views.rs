//! Server-rendered pages.
//!
//! Every value that came from a user goes through `html_escape` before it is
//! written into markup.

use std::fmt::Write;

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use crate::db::User;

fn layout(title: &str, user: Option<&User>, body: &str) -> String {
    let mut nav = String::new();
    if let Some(user) = user {
        nav.push_str(r#"<nav><a href="/">Home</a> <a href="/settings">Settings</a>"#);
        if user.admin {
            nav.push_str(r#" <a href="/users">Users</a>"#);
        }
        let _ = write!(
            nav,
            r#" <span class="who">{}</span> <a href="/logout">Log out</a></nav>"#,
            text(&user.username)
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} - Sorbet</title>
<link rel="stylesheet" href="/css/sorbet.css">
</head>
<body>
{nav}
<main>
{body}
</main>
</body>
</html>
"#,
        title = text(title),
    )
}

pub fn login() -> String {
    layout(
        "Log in",
        None,
        r#"<h1>Sorbet</h1>
<form method="post" action="/login" class="card">
<label>Username <input type="text" name="username" autocomplete="username" required autofocus></label>
<label>Password <input type="password" name="password" autocomplete="current-password" required></label>
<button type="submit">Log in</button>
</form>"#,
    )
}

pub fn login_2fa() -> String {
    layout(
        "Two-factor authentication",
        None,
        r#"<h1>Two-factor authentication</h1>
<form method="post" action="/login/2fa" class="card">
<label>Code <input type="text" name="token" inputmode="numeric" pattern="[0-9]{6}" maxlength="6" autocomplete="one-time-code" required autofocus></label>
<button type="submit">Verify</button>
</form>
<p><a href="/logout">Cancel</a></p>"#,
    )
}

pub fn index(user: &User) -> String {
    let body = format!(
        r#"<h1>Welcome, {}</h1>
<p>Two-factor authentication is <strong>{}</strong>.</p>"#,
        text(&user.username),
        if user.two_factor { "enabled" } else { "disabled" },
    );
    layout("Home", Some(user), &body)
}

pub fn settings(user: &User) -> String {
    let two_factor = if user.two_factor {
        r#"<p>Two-factor authentication is enabled.</p>
<button type="button" id="tfa-disable">Disable two-factor</button>"#
            .to_string()
    } else {
        r##"<p>Two-factor authentication is disabled.</p>
<button type="button" id="tfa-generate">Set up two-factor</button>
<div id="tfa-enroll" hidden>
<p>Add this key to your authenticator app, then enter the code it shows.</p>
<p><code id="tfa-secret"></code></p>
<p><a id="tfa-url" href="#">otpauth link</a></p>
<label>Code <input type="text" id="tfa-token" inputmode="numeric" maxlength="6" autocomplete="one-time-code"></label>
<button type="button" id="tfa-verify">Verify</button>
<p id="tfa-error" class="error" hidden></p>
</div>"##
            .to_string()
    };

    let body = format!(
        r#"<h1>Settings</h1>
<form method="post" action="/settings" class="card">
<p>Leave a field blank to keep its current value.</p>
<label>Username <input type="text" name="username" value="{}" autocomplete="username"></label>
<label>Password <input type="password" name="password" autocomplete="new-password"></label>
<button type="submit">Save</button>
</form>
<section class="card">
<h2>Two-factor authentication</h2>
{two_factor}
</section>
<script src="/js/settings.js"></script>"#,
        attr(&user.username),
    );
    layout("Settings", Some(user), &body)
}

pub fn users(current: &User, users: &[User]) -> String {
    let mut rows = String::new();
    for user in users {
        let _ = write!(
            rows,
            r#"<tr>
<td>{id}</td>
<td>{name}</td>
<td>{admin}</td>
<td>{two_factor}</td>
<td>
<form method="post" action="/users/admin" class="inline">
<input type="hidden" name="id" value="{id}">
<button type="submit">{toggle}</button>
</form>
<form method="post" action="/users/delete" class="inline">
<input type="hidden" name="username" value="{name_attr}">
<label><input type="checkbox" name="accept" value="true"> confirm</label>
<button type="submit">Delete</button>
</form>
</td>
</tr>
"#,
            id = user.id,
            name = text(&user.username),
            name_attr = attr(&user.username),
            admin = if user.admin { "yes" } else { "no" },
            two_factor = if user.two_factor { "yes" } else { "no" },
            toggle = if user.admin {
                "Revoke admin"
            } else {
                "Make admin"
            },
        );
    }

    let body = format!(
        r#"<h1>Users</h1>
<table>
<thead><tr><th>ID</th><th>Username</th><th>Admin</th><th>2FA</th><th></th></tr></thead>
<tbody>
{rows}</tbody>
</table>
<form method="post" action="/users/new" class="card">
<h2>New user</h2>
<label>Username <input type="text" name="username" required></label>
<label>Password <input type="password" name="password" autocomplete="new-password" required></label>
<label><input type="checkbox" name="admin" value="true"> Administrator</label>
<button type="submit">Create</button>
</form>"#
    );
    layout("Users", Some(current), &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str, admin: bool) -> User {
        User {
            id: 7,
            username: name.to_string(),
            admin,
            two_factor: false,
            two_factor_secret: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_usernames_are_escaped() {
        let evil = user("<script>alert(1)</script>", true);

        let page = users(&evil, std::slice::from_ref(&evil));
        assert!(!page.contains("<script>alert"));
        assert!(page.contains("&lt;script&gt;"));

        let page = settings(&user(r#"a"><img src=x>"#, false));
        assert!(!page.contains(r#"a"><img"#));
    }

    #[test]
    fn test_users_link_only_for_admins() {
        assert!(index(&user("root", true)).contains(r#"href="/users""#));
        assert!(!index(&user("bob", false)).contains(r#"href="/users""#));
    }

    #[test]
    fn test_settings_offers_matching_two_factor_action() {
        let mut u = user("bob", false);
        assert!(settings(&u).contains("tfa-generate"));

        u.two_factor = true;
        let page = settings(&u);
        assert!(page.contains("tfa-disable"));
        assert!(!page.contains("tfa-generate"));
    }

    #[test]
    fn test_login_pages_post_to_their_routes() {
        assert!(login().contains(r#"action="/login""#));
        assert!(login_2fa().contains(r#"action="/login/2fa""#));
    }
}
