use anyhow::Result;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};

/// Minimal actor trait. `Self: Sized` avoids object-safety issues when using `Context<Self>`.
#[async_trait::async_trait]
pub trait Actor: Send + Sized + 'static {
    type Msg: Send + 'static;

    /// Handle a single message. Return `Err` to stop the actor.
    async fn handle(&mut self, msg: Self::Msg, ctx: &mut Context<Self>) -> Result<()>;
}

/// Runtime context for an actor instance.
///
/// Holds only a weak sender so the mailbox closes once every external `Addr`
/// is dropped.
pub struct Context<A: Actor> {
    addr: mpsc::WeakSender<A::Msg>,
    stop: bool,
}

impl<A: Actor> Context<A> {
    /// Get this actor's `Addr`, if anyone outside still holds one.
    pub fn addr(&self) -> Option<Addr<A>> {
        self.addr.upgrade().map(Addr)
    }

    /// Request a graceful stop after processing the current message.
    ///
    /// ```
    /// # use anyhow::Result;
    /// # use async_trait::async_trait;
    /// # use sieve_actors::actor::{self, Actor, Context};
    /// # struct StopOnSecond(u8);
    /// # #[async_trait]
    /// # impl Actor for StopOnSecond {
    /// #     type Msg = u8;
    /// #     async fn handle(&mut self, msg: Self::Msg, ctx: &mut Context<Self>) -> Result<()> {
    /// #         self.0 += msg;
    /// #         if self.0 >= 2 {
    /// #             ctx.stop();
    /// #         }
    /// #         Ok(())
    /// #     }
    /// # }
    /// let rt = tokio::runtime::Runtime::new().unwrap();
    /// rt.block_on(async {
    ///     let actor::ActorHandle { addr, task } = actor::spawn_actor(StopOnSecond(0), 4);
    ///     addr.send(1).await.unwrap();
    ///     addr.send(1).await.unwrap();
    ///     drop(addr);
    ///     task.await.unwrap().unwrap();
    /// });
    /// ```
    pub fn stop(&mut self) {
        self.stop = true;
    }
}

/// Address for sending messages to an actor.
pub struct Addr<A: Actor>(mpsc::Sender<A::Msg>);

/// Manual Clone to avoid unnecessary bounds on `A`/`A::Msg`.
impl<A: Actor> Clone for Addr<A> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<A: Actor> Addr<A> {
    /// Async send; awaits backpressure. Returns the message if the receiver is dropped.
    pub async fn send(&self, msg: A::Msg) -> std::result::Result<(), A::Msg> {
        self.0.send(msg).await.map_err(|e| e.0)
    }

    /// Try to send without waiting. Returns the message if the mailbox is full or closed.
    pub fn try_send(&self, msg: A::Msg) -> std::result::Result<(), A::Msg> {
        self.0.try_send(msg).map_err(|e| e.into_inner())
    }

    /// Bounded mailbox capacity.
    pub fn capacity(&self) -> usize {
        self.0.max_capacity()
    }

    /// True once the actor task has stopped receiving.
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

/// Handle to a running actor task.
pub struct ActorHandle<A: Actor> {
    pub addr: Addr<A>,
    pub task: JoinHandle<anyhow::Result<()>>,
}

/// Spawn an actor with a bounded mailbox.
///
/// Stop conditions:
/// - `handle` returns `Err`
/// - all senders are dropped
/// - `ctx.stop()` is called
///
/// ```
/// # use anyhow::Result;
/// # use async_trait::async_trait;
/// # use sieve_actors::actor::{self, Actor, Context};
/// # struct Accumulator(u8);
/// # #[async_trait]
/// # impl Actor for Accumulator {
/// #     type Msg = u8;
/// #     async fn handle(&mut self, msg: Self::Msg, ctx: &mut Context<Self>) -> Result<()> {
/// #         self.0 += msg;
/// #         if self.0 >= 5 {
/// #             ctx.stop();
/// #         }
/// #         Ok(())
/// #     }
/// # }
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// rt.block_on(async {
///     let actor::ActorHandle { addr, task } = actor::spawn_actor(Accumulator(0), 8);
///     addr.send(2).await.unwrap();
///     addr.send(3).await.unwrap();
///     drop(addr);
///     task.await.unwrap().unwrap();
/// });
/// ```
pub fn spawn_actor<A: Actor>(actor: A, capacity: usize) -> ActorHandle<A> {
    spawn_actor_with_shutdown(actor, capacity, None)
}

/// Like [`spawn_actor`], but the loop also exits when `shutdown` fires.
pub fn spawn_actor_with_shutdown<A: Actor>(
    actor: A,
    capacity: usize,
    shutdown: Option<broadcast::Receiver<()>>,
) -> ActorHandle<A> {
    let (tx, rx) = mpsc::channel::<A::Msg>(capacity.max(1));
    let addr = Addr(tx);
    let ctx = Context {
        addr: addr.0.downgrade(),
        stop: false,
    };
    let task = tokio::spawn(run_loop(actor, ctx, rx, shutdown));
    ActorHandle { addr, task }
}

async fn run_loop<A: Actor>(
    mut actor: A,
    mut ctx: Context<A>,
    mut rx: mpsc::Receiver<A::Msg>,
    shutdown: Option<broadcast::Receiver<()>>,
) -> Result<()> {
    let mut shutdown = shutdown;
    loop {
        let maybe_msg = match shutdown.as_mut() {
            Some(shutdown_rx) => {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    msg = rx.recv() => msg,
                }
            }
            None => rx.recv().await,
        };
        let Some(msg) = maybe_msg else { break };

        if let Err(e) = actor.handle(msg, &mut ctx).await {
            tracing::error!(target = "sieve-actors", error = ?e, "actor returned error; stopping");
            return Err(e);
        }
        if ctx.stop {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    enum CounterMsg {
        Add(u32),
        Get(oneshot::Sender<u32>),
        Fail,
    }

    struct Counter(u32);

    #[async_trait::async_trait]
    impl Actor for Counter {
        type Msg = CounterMsg;

        async fn handle(&mut self, msg: Self::Msg, _ctx: &mut Context<Self>) -> Result<()> {
            match msg {
                CounterMsg::Add(n) => self.0 += n,
                CounterMsg::Get(reply) => {
                    let _ = reply.send(self.0);
                }
                CounterMsg::Fail => anyhow::bail!("asked to fail"),
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn processes_messages_in_order() {
        let ActorHandle { addr, task } = spawn_actor(Counter(0), 4);
        addr.send(CounterMsg::Add(2)).await.ok();
        addr.send(CounterMsg::Add(3)).await.ok();
        let (tx, rx) = oneshot::channel();
        addr.send(CounterMsg::Get(tx)).await.ok();
        assert_eq!(rx.await.unwrap(), 5);
        drop(addr);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stops_when_handler_errors() {
        let ActorHandle { addr, task } = spawn_actor(Counter(0), 4);
        addr.send(CounterMsg::Fail).await.ok();
        assert!(task.await.unwrap().is_err());
        assert!(addr.is_closed());
    }

    #[tokio::test]
    async fn exits_on_shutdown_signal() {
        let (tx, rx) = broadcast::channel(1);
        let ActorHandle { addr, task } = spawn_actor_with_shutdown(Counter(0), 4, Some(rx));
        tx.send(()).unwrap();
        task.await.unwrap().unwrap();
        drop(addr);
    }
}
