use mediawiki_api::{WikiClient, WikiClientConfig, WikiLanguage};

fn main() {
    pretty_env_logger::init();

    let mut args = std::env::args();

    args.next();

    let Some(title) = args.next() else {
        log::error!("Usage: mediawiki-api-cli <title> [language]");
        std::process::exit(2);
    };

    let mut config = WikiClientConfig::new();

    if let Some(lang) = args.next() {
        if let Some(language) = WikiLanguage::from_code(lang.as_str()) {
            config = config.language(language);
        } else {
            log::warn!("Language entered is invalid")
        }
    }

    let client = match WikiClient::from_config(config) {
        Ok(client) => client,
        Err(error) => {
            log::error!("Could not create the client: {error}");
            std::process::exit(1);
        }
    };

    match lookup(&client, title.as_str()) {
        Ok(report) => println!("{report}"),
        Err(error) => {
            log::error!("Lookup failed: {error}");
            std::process::exit(1);
        }
    }
}

fn lookup(client: &WikiClient, title: &str) -> mediawiki_api::Result<String> {
    let page = client.page(title)?;

    let mut report = format!("{}\n{}\n", page.title(), page.url());

    if page.is_disambiguation() {
        report.push_str("\nmay refer to:\n");

        for option in page.disambiguation_options() {
            report.push_str(format!("  {option}\n").as_str());
        }
    } else {
        report.push('\n');
        report.push_str(page.summary(client)?);
    }

    Ok(report)
}
