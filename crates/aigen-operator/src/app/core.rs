use anyhow::Result;

use crate::app::services::ApplicationServices;
use crate::app::tasks::Tasks;
use crate::config::ControllerArgs;

pub struct Application {
    services: ApplicationServices,
    args: ControllerArgs,
}

impl Application {
    pub fn new(services: ApplicationServices, args: ControllerArgs) -> Self {
        Self { services, args }
    }

    pub fn services(&self) -> &ApplicationServices {
        &self.services
    }

    pub fn args(&self) -> &ControllerArgs {
        &self.args
    }

    /// Run application, start all tasks and wait for completion
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Starting all application tasks...");

        let mut tasks = Tasks::new(self.services.cancellation_token.clone());

        if let Err(e) = tasks.spawn_all_tasks(self) {
            tracing::error!("Failed to spawn application tasks: {}", e);
            return Err(e);
        }

        if let Err(e) = tasks.wait_for_completion(self.args.shutdown_timeout()).await {
            tracing::error!("Error during task execution: {}", e);
            return Err(e);
        }

        tracing::info!("Application run completed");
        Ok(())
    }

    /// Gracefully shutdown application
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down application...");

        self.services.cancellation_token.cancel();
        self.services
            .dispatcher
            .drain(self.args.shutdown_timeout())
            .await;

        tracing::info!("Application shutdown completed");
        Ok(())
    }
}
