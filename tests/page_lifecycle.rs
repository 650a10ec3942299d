use std::path::{Path, PathBuf};

use board_page::theme::ColorScheme;
use board_page::{CliArgs, Command, LikeArgs, PageArgs, PrefsArgs, RenderArgs, ToggleArgs};
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use tempfile::tempdir;
use url::Url;

const POST_PAGE: &str = r#"<!DOCTYPE html>
<html lang="ko">
<head><meta charset="utf-8"><title>free board</title></head>
<body>
  <article class="post" id="post-3">
    <div class="post-content" data-markdown="**bold** line&#10;next line&#10;&#10;```python&#10;print(&amp;quot;hi&amp;quot;)&#10;```">fallback</div>
    <form method="post" action="/action/like/3">
      <input type="hidden" name="author">
      <input type="hidden" name="redirect_to" value="/post/3">
      <button type="button" class="like-btn" onclick="handleLike(this, 3)">Like</button>
    </form>
  </article>
  <section class="reply" data-markdown="&amp;lt;em&amp;gt;hi&amp;lt;/em&amp;gt;&#10;world">fallback</section>
</body>
</html>"#;

fn read_to_string(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

fn page_args(input: &Path, out: Option<PathBuf>, base_url: Option<Url>) -> PageArgs {
    PageArgs {
        input: input.to_path_buf(),
        out,
        base_url,
    }
}

fn prefs_args(prefs: &Path, color_scheme: ColorScheme) -> PrefsArgs {
    PrefsArgs {
        prefs: prefs.to_path_buf(),
        color_scheme,
    }
}

#[tokio::test]
async fn render_applies_theme_and_markdown() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("post.html");
    let prefs = tmp.path().join("prefs.json");
    std::fs::write(&input, POST_PAGE).unwrap();

    // No saved preference, OS prefers dark.
    let out = tmp.path().join("out/dark.html");
    let args = CliArgs {
        command: Command::Render(RenderArgs {
            page: page_args(&input, Some(out.clone()), None),
            prefs: prefs_args(&prefs, ColorScheme::Dark),
            no_markdown: false,
            no_highlight: false,
        }),
    };
    board_page::run(args).await.unwrap();

    let html = read_to_string(&out);
    assert!(html.contains(r#"data-theme="dark""#));
    assert!(html.contains("<strong>bold</strong> line<br>\nnext line"));
    assert!(html.contains("<em>hi</em><br>\nworld"));
    assert!(html.contains(r#"class="language-python hl""#));
    assert!(html.contains(r#"data-highlighted="yes""#));
    assert!(!html.contains("fallback"));
    // Initialization alone never persists anything.
    assert!(!prefs.exists());

    // No preference at all: the attribute stays unset and code stays plain.
    let out = tmp.path().join("out/plain.html");
    let args = CliArgs {
        command: Command::Render(RenderArgs {
            page: page_args(&input, Some(out.clone()), None),
            prefs: prefs_args(&prefs, ColorScheme::NoPreference),
            no_markdown: false,
            no_highlight: true,
        }),
    };
    board_page::run(args).await.unwrap();

    let html = read_to_string(&out);
    assert!(!html.contains("data-theme"));
    assert!(html.contains(
        "<pre><code class=\"language-python\">print(\"hi\")\n</code></pre>"
    ));
    assert!(!html.contains("data-highlighted"));
}

#[tokio::test]
async fn render_without_markdown_leaves_payloads_alone() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("post.html");
    let out = tmp.path().join("out.html");
    std::fs::write(&input, POST_PAGE).unwrap();

    let args = CliArgs {
        command: Command::Render(RenderArgs {
            page: page_args(&input, Some(out.clone()), None),
            prefs: prefs_args(&tmp.path().join("prefs.json"), ColorScheme::Light),
            no_markdown: true,
            no_highlight: false,
        }),
    };
    board_page::run(args).await.unwrap();

    let html = read_to_string(&out);
    assert_eq!(html.matches(">fallback<").count(), 2);
}

#[tokio::test]
async fn toggle_persists_and_render_restores() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("post.html");
    let prefs = tmp.path().join("prefs/board.json");
    std::fs::write(&input, POST_PAGE).unwrap();

    // OS dark → initialized dark → toggled light.
    let toggled = tmp.path().join("toggled.html");
    let args = CliArgs {
        command: Command::ToggleTheme(ToggleArgs {
            page: page_args(&input, Some(toggled.clone()), None),
            prefs: prefs_args(&prefs, ColorScheme::Dark),
        }),
    };
    board_page::run(args).await.unwrap();
    assert!(read_to_string(&toggled).contains(r#"data-theme="light""#));
    assert!(read_to_string(&prefs).contains(r#""theme": "light""#));

    // The saved preference beats the OS on the next load.
    let rendered = tmp.path().join("rendered.html");
    let args = CliArgs {
        command: Command::Render(RenderArgs {
            page: page_args(&input, Some(rendered.clone()), None),
            prefs: prefs_args(&prefs, ColorScheme::Dark),
            no_markdown: false,
            no_highlight: false,
        }),
    };
    board_page::run(args).await.unwrap();
    assert!(read_to_string(&rendered).contains(r#"data-theme="light""#));

    // Toggling again flips it back.
    let args = CliArgs {
        command: Command::ToggleTheme(ToggleArgs {
            page: page_args(&input, Some(toggled.clone()), None),
            prefs: prefs_args(&prefs, ColorScheme::Light),
        }),
    };
    board_page::run(args).await.unwrap();
    assert!(read_to_string(&toggled).contains(r#"data-theme="dark""#));
    assert!(read_to_string(&prefs).contains(r#""theme": "dark""#));
}

fn like_args(
    input: &Path,
    base_url: &Url,
    author: Option<&str>,
    out: Option<PathBuf>,
) -> LikeArgs {
    LikeArgs {
        page: page_args(input, out, Some(base_url.clone())),
        control: "#post-3 .like-btn".to_string(),
        post_id: "3".to_string(),
        author: author.map(str::to_string),
        dry_run: false,
        user_agent: "test-agent".to_string(),
    }
}

#[tokio::test]
async fn like_posts_trimmed_author_and_follows_redirect() {
    let server = MockServer::start();
    let like = server.mock(|when, then| {
        when.method(POST)
            .path("/action/like/3")
            .body("author=Alice&redirect_to=%2Fpost%2F3");
        then.status(303).header("Location", "/post/3");
    });
    let landing = server.mock(|when, then| {
        when.method(GET).path("/post/3");
        then.status(200).body("<html></html>");
    });

    let tmp = tempdir().unwrap();
    let input = tmp.path().join("post.html");
    let out = tmp.path().join("after-like.html");
    std::fs::write(&input, POST_PAGE).unwrap();
    let base_url = Url::parse(&server.url("/post/3")).unwrap();

    let args = CliArgs {
        command: Command::Like(like_args(
            &input,
            &base_url,
            Some(" Alice "),
            Some(out.clone()),
        )),
    };
    board_page::run(args).await.unwrap();

    like.assert();
    landing.assert();
    assert!(read_to_string(&out).contains(r#"value="Alice""#));
}

#[tokio::test]
async fn blank_like_sends_nothing() {
    let server = MockServer::start();
    let like = server.mock(|when, then| {
        when.method(POST).path("/action/like/3");
        then.status(303).header("Location", "/post/3");
    });

    let tmp = tempdir().unwrap();
    let input = tmp.path().join("post.html");
    let out = tmp.path().join("after-like.html");
    std::fs::write(&input, POST_PAGE).unwrap();
    let base_url = Url::parse(&server.url("/post/3")).unwrap();

    let args = CliArgs {
        command: Command::Like(like_args(
            &input,
            &base_url,
            Some("   "),
            Some(out.clone()),
        )),
    };
    board_page::run(args).await.unwrap();

    like.assert_hits(0);
    assert!(!out.exists());
}

#[tokio::test]
async fn like_outside_a_form_fails() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("post.html");
    std::fs::write(
        &input,
        r#"<html><body><button class="like-btn" id="stray">Like</button></body></html>"#,
    )
    .unwrap();
    let base_url = Url::parse("http://127.0.0.1:9/post/3").unwrap();

    let mut args = like_args(&input, &base_url, Some("Alice"), None);
    args.control = "#stray".to_string();
    let err = board_page::run(CliArgs {
        command: Command::Like(args),
    })
    .await
    .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<board_page::like::LikeError>(),
        Some(board_page::like::LikeError::MissingForm)
    ));
}
