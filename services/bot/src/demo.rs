use std::io;
use std::sync::Arc;

use clap::Args;

use gatehouse::error::AppError;
use gatehouse::workflows::intake::{
    ActionId, ActionTrigger, ChannelId, IntakeService, TransportError, UserId,
};

use crate::infra::{
    demo_intake_config, ChannelCommandSink, InMemoryApplicationRepository, InMemoryPlatform,
    RecordingResponder,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Walk the rejection path instead of approving
    #[arg(long)]
    pub(crate) reject: bool,
}

const DEMO_ANSWERS: [&str; 6] = [
    "Ana Souza",
    "27",
    "pw1",
    "Grew up at the docks, smuggling spare parts.",
    "STEAM_0:1:4791",
    "A friend's invite",
];

/// Scripted end-to-end run against in-memory infrastructure: entry prompt,
/// a full questionnaire session, review posting, and one staff decision.
pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let platform = Arc::new(InMemoryPlatform::default());
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let config = demo_intake_config();
    let sink = Arc::new(ChannelCommandSink::new(
        platform.clone(),
        config.provisioning_channel.clone(),
    ));
    let service = Arc::new(IntakeService::new(
        platform.clone(),
        repository.clone(),
        sink,
        config.clone(),
    ));

    service.ensure_entry_prompt().await.map_err(demo_error)?;

    let applicant = UserId("demo-applicant".to_string());
    let responder = RecordingResponder::default();
    service
        .handle_trigger(ActionTrigger::new(
            ActionId::StartIntake,
            applicant.clone(),
            config.entry_channel.clone(),
            Box::new(responder.clone()),
        ))
        .await;

    let conversation = ChannelId(format!("intake-1-{applicant}"));
    for (index, answer) in DEMO_ANSWERS.iter().enumerate() {
        platform.wait_for_messages(&conversation, index + 2).await;
        platform.say(&conversation, &applicant, answer);
    }
    platform.wait_for_messages(&config.review_channel, 1).await;

    println!("Applicant transcript (#{conversation})");
    for message in platform.transcript(&conversation) {
        println!("  bot: {}", first_line(&message.body));
    }

    println!("\nReview posting (#{})", config.review_channel);
    for message in platform.transcript(&config.review_channel) {
        println!("  {}", first_line(&message.body));
        for (label, answer) in &message.fields {
            println!("    {label}: {answer}");
        }
    }

    let staff = UserId("demo-staff".to_string());
    if args.reject {
        let responder = RecordingResponder::default();
        let trigger = ActionTrigger::new(
            ActionId::Reject(applicant.clone()),
            staff.clone(),
            config.review_channel.clone(),
            Box::new(responder.clone()),
        );
        let decision = tokio::spawn({
            let service = service.clone();
            async move { service.handle_trigger(trigger).await }
        });
        responder.wait_for_replies(1).await;
        platform.say(
            &config.review_channel,
            &staff,
            "Backstory needs another pass",
        );
        let _ = decision.await;

        println!("\nRejection notice (#{})", config.rejected_channel);
        for message in platform.transcript(&config.rejected_channel) {
            println!("  {}", message.body.replace('\n', "\n  "));
        }
    } else {
        service
            .handle_trigger(ActionTrigger::new(
                ActionId::Approve(applicant.clone()),
                staff.clone(),
                config.review_channel.clone(),
                Box::new(RecordingResponder::default()),
            ))
            .await;

        println!("\nApproval notice (#{})", config.approved_channel);
        for message in platform.transcript(&config.approved_channel) {
            println!("  {}", message.body.replace('\n', "\n  "));
        }

        println!("\nProvisioning commands (#{})", config.provisioning_channel);
        for message in platform.transcript(&config.provisioning_channel) {
            println!("  {}", message.body);
        }

        println!("\nGranted roles");
        for (user, role) in platform.granted_roles() {
            println!("  {user} -> {role}");
        }
    }

    println!("\nStored applications");
    for record in repository.all() {
        let reason = record
            .rejection_reason
            .as_deref()
            .map(|reason| format!(" ({reason})"))
            .unwrap_or_default();
        println!(
            "  {} {} -> {}{}",
            record.id,
            record.display_name,
            record.status.label(),
            reason
        );
    }

    Ok(())
}

fn first_line(body: &str) -> &str {
    body.lines().next().unwrap_or_default()
}

fn demo_error(err: TransportError) -> AppError {
    AppError::Io(io::Error::new(io::ErrorKind::Other, err.to_string()))
}
