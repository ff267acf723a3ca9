use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use reqwest::Client;

use crate::client::rest::SupabaseClient;
use crate::config::Settings;
use crate::error::StoreError;

pub struct Doctor;

impl Doctor {
    pub async fn check(settings: &Settings) -> Result<()> {
        println!("{}", "Leki Doctor - configuration report".green().bold());
        println!("{}", "─".repeat(40).dimmed());

        print!("• Credentials ... ");
        let missing: Vec<&str> = [
            ("SUPABASE_URL", &settings.supabase_url),
            ("SUPABASE_KEY", &settings.supabase_key),
            ("GROQ_API_KEY", &settings.groq_api_key),
            ("OPENAI_API_KEY", &settings.openai_api_key),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
        if missing.is_empty() {
            println!("{}", "OK".green());
        } else {
            println!("{} ({})", "MISSING".red(), missing.join(", "));
        }

        print!("• Chunking ({} / {}) ... ", settings.chunk_size, settings.chunk_overlap);
        match settings.chunk_params() {
            Ok(_) => println!("{}", "OK".green()),
            Err(e) => println!("{} ({})", "INVALID".red(), e),
        }

        let timeout = Duration::from_secs(settings.request_timeout_secs.min(15));

        print!("• Supabase (kb_documents) ... ");
        if settings.supabase_url.trim().is_empty() {
            println!("{}", "SKIPPED".yellow());
        } else {
            let probe = async {
                let db = SupabaseClient::new(&settings.supabase_url, settings.write_key(), timeout)?;
                let count = db.table("kb_documents").select("id").count().await?;
                Ok::<_, StoreError>((db.rest_url().to_string(), count))
            };
            match probe.await {
                Ok((url, count)) => println!("{} ({} documents at {})", "OK".green(), count, url),
                Err(e) => println!("{} ({})", "FAIL".red(), e),
            }
        }

        let http = Client::builder().timeout(timeout).build()?;
        for (label, base_url, key) in [
            ("Groq", &settings.groq_base_url, &settings.groq_api_key),
            ("OpenAI", &settings.openai_base_url, &settings.openai_api_key),
        ] {
            print!("• {} API ... ", label);
            if key.trim().is_empty() {
                println!("{}", "SKIPPED".yellow());
                continue;
            }
            let url = format!("{}/models", base_url.trim_end_matches('/'));
            match http.get(&url).bearer_auth(key).send().await {
                Ok(res) if res.status().is_success() => println!("{}", "OK".green()),
                Ok(res) => println!("{} (HTTP {})", "FAIL".red(), res.status()),
                Err(e) => println!("{} ({})", "FAIL".red(), e),
            }
        }

        println!("\nDone. Fix any MISSING or FAIL lines in .env or leki.toml.");
        Ok(())
    }
}
