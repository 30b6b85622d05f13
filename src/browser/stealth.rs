use crate::browser::BrowserConfig;

/// Generate the script installed on every new document before page scripts
/// run. It hides the usual automation fingerprints a headless Chrome leaks.
pub fn masking_script(config: &BrowserConfig) -> String {
    let languages = config
        .languages
        .iter()
        .map(|l| format!("'{}'", l.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"
        (() => {{
            Object.defineProperty(navigator, 'webdriver', {{ get: () => undefined }});

            Object.defineProperty(navigator, 'languages', {{ get: () => [{languages}] }});

            // Headless reports an empty plugin list
            Object.defineProperty(navigator, 'plugins', {{
                get: () => [
                    {{ name: 'PDF Viewer', filename: 'internal-pdf-viewer' }},
                    {{ name: 'Chrome PDF Viewer', filename: 'internal-pdf-viewer' }},
                    {{ name: 'Chromium PDF Viewer', filename: 'internal-pdf-viewer' }}
                ]
            }});

            if (!window.chrome) {{
                window.chrome = {{ runtime: {{}}, app: {{ isInstalled: false }} }};
            }}

            const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
            if (originalQuery) {{
                window.navigator.permissions.query = (parameters) =>
                    parameters && parameters.name === 'notifications'
                        ? Promise.resolve({{ state: Notification.permission }})
                        : originalQuery(parameters);
            }}

            Object.defineProperty(navigator, 'hardwareConcurrency', {{ get: () => 8 }});
        }})()
        "#
    )
}
