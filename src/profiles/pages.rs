use crate::profiles::repo_types::ProfileRecord;

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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

/// Static profile page. `image_href` points at the exported picture, if any.
pub fn render_profile_page(record: &ProfileRecord, image_href: Option<&str>) -> String {
    let img = image_href
        .map(|href| format!("<img src=\"{}\" alt=\"profile picture\" />", escape_html(href)))
        .unwrap_or_default();
    format!(
        "<html><head><title>Profile</title></head><body>\
         <h1>Profile</h1>\
         <p>Email: {}</p>\
         <p>State: {}</p>\
         <p>User type: {}</p>\
         {}</body></html>",
        escape_html(&record.email),
        record.state,
        record.user_type.as_i32(),
        img
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::repo_types::UserType;

    fn record(email: &str) -> ProfileRecord {
        ProfileRecord::new(email.into(), "hash".into(), false, UserType::parse(2).unwrap())
    }

    #[test]
    fn page_lists_profile_fields() {
        let html = render_profile_page(&record("a@x.com"), Some("../images/a_x.com.png"));
        assert!(html.contains("<p>Email: a@x.com</p>"));
        assert!(html.contains("<p>State: false</p>"));
        assert!(html.contains("<p>User type: 2</p>"));
        assert!(html.contains("src=\"../images/a_x.com.png\""));
        assert!(!html.contains("hash"));
    }

    #[test]
    fn page_without_picture_has_no_img() {
        let html = render_profile_page(&record("a@x.com"), None);
        assert!(!html.contains("<img"));
    }

    #[test]
    fn interpolated_values_are_escaped() {
        let html = render_profile_page(&record("<b>@x.com"), None);
        assert!(html.contains("&lt;b&gt;@x.com"));
        assert!(!html.contains("<b>@"));
    }
}
